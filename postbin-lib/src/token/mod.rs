use std::{fmt, str::FromStr};

use rama::{
    http::{Response, StatusCode},
    telemetry::tracing,
    utils::time::now_unix_ms,
};
use serde::Serialize;
use serde_json::Value;

use crate::http::{KnownContentType, RequestContext, response};

const GRANT_TYPE_CLIENT_CREDENTIALS: &str = "client_credentials";
const FIELD_GRANT_TYPE: &str = "grant_type";
const FIELD_ACCESS_TOKEN: &str = "access_token";
const FIELD_TOKEN_TYPE: &str = "token_type";
const PASSTHROUGH_FIELDS: &[&str] = &["expires_in", "refresh_token"];

const UNSUPPORTED_CONTENT_TYPE_MESSAGE: &str =
    r#"Please submit data in "x-www-form-urlencoded" format only"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Which request content types the token endpoint accepts.
pub enum ContentTypePolicy {
    /// Only the exact `application/x-www-form-urlencoded` header value.
    #[default]
    Strict,
    /// Any body postbin can parse, JSON included.
    Lenient,
}

impl ContentTypePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Lenient => "lenient",
        }
    }
}

impl fmt::Display for ContentTypePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentTypePolicy {
    type Err = ContentTypePolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            other => Err(ContentTypePolicyParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypePolicyParseError(String);

impl fmt::Display for ContentTypePolicyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ContentTypePolicyParseError: unknown policy '{}' (expected strict or lenient)",
            self.0
        )
    }
}

impl std::error::Error for ContentTypePolicyParseError {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenIssuerConfig {
    pub content_type: ContentTypePolicy,
    /// Echo `token_type` alongside the other passthrough fields.
    pub echo_token_type: bool,
    /// Use a caller supplied `access_token` field instead of the current time.
    pub allow_token_override: bool,
}

/// Mints opaque access tokens for `client_credentials` grant requests.
///
/// A token is the issue time in unix milliseconds, which is exactly
/// what [`crate::simulate::FreshnessCheck`] expects to receive back.
#[derive(Debug, Clone, Default)]
pub struct TokenIssuer {
    config: TokenIssuerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenResponse {
    pub access_token: Value,
    #[serde(flatten)]
    pub echoed: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenIssueError {
    UnsupportedContentType(Option<String>),
    InvalidGrantType(Option<String>),
}

impl fmt::Display for TokenIssueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedContentType(ct) => {
                write!(f, "unsupported content type: {ct:?}")
            }
            Self::InvalidGrantType(grant_type) => {
                write!(f, "invalid grant type: {grant_type:?}")
            }
        }
    }
}

impl std::error::Error for TokenIssueError {}

impl TokenIssuer {
    pub fn new(config: TokenIssuerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TokenIssuerConfig {
        &self.config
    }

    pub fn issue(
        &self,
        ctx: &RequestContext,
        now_ms: i64,
    ) -> Result<TokenResponse, TokenIssueError> {
        if self.config.content_type == ContentTypePolicy::Strict
            && ctx.content_type() != Some(KnownContentType::FORM_URLENCODED)
        {
            return Err(TokenIssueError::UnsupportedContentType(
                ctx.content_type().map(ToOwned::to_owned),
            ));
        }

        let grant_type = ctx.body_field(FIELD_GRANT_TYPE).and_then(Value::as_str);
        if grant_type != Some(GRANT_TYPE_CLIENT_CREDENTIALS) {
            return Err(TokenIssueError::InvalidGrantType(
                grant_type.map(ToOwned::to_owned),
            ));
        }

        let mut echoed = serde_json::Map::new();
        let token_type = self.config.echo_token_type.then_some(FIELD_TOKEN_TYPE);
        for field in PASSTHROUGH_FIELDS.iter().copied().chain(token_type) {
            let value = ctx
                .body_field(field)
                .cloned()
                .or_else(|| ctx.query(field).map(Value::from));
            if let Some(value) = value {
                echoed.insert(field.to_owned(), value);
            }
        }

        let access_token = self
            .config
            .allow_token_override
            .then(|| ctx.body_field(FIELD_ACCESS_TOKEN))
            .flatten()
            .filter(|v| v.is_string() || v.is_number())
            .cloned()
            .unwrap_or_else(|| Value::String(now_ms.to_string()));

        Ok(TokenResponse {
            access_token,
            echoed,
        })
    }

    pub fn respond(&self, ctx: &RequestContext) -> Response {
        let resp = match self.issue(ctx, now_unix_ms()) {
            Ok(token) => {
                tracing::info!(access_token = %token.access_token, "valid token generated");
                match serde_json::to_value(&token) {
                    Ok(value) => response::json(StatusCode::OK, value),
                    Err(err) => {
                        tracing::error!("failed to serialize token response: {err}");
                        response::internal_error()
                    }
                }
            }
            Err(TokenIssueError::UnsupportedContentType(content_type)) => {
                tracing::info!(
                    ?content_type,
                    "invalid content type for token request, responding with 415"
                );
                // no body log for rejected content types
                return response::plain_text(
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    UNSUPPORTED_CONTENT_TYPE_MESSAGE,
                );
            }
            Err(TokenIssueError::InvalidGrantType(grant_type)) => {
                tracing::info!(?grant_type, "invalid grant_type in token request body");
                response::json_error(StatusCode::BAD_REQUEST, "invalid grant type")
            }
        };

        tracing::info!(body = %ctx.body_summary(), "token request body");
        resp
    }
}
