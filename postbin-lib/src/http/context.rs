use std::{
    collections::HashMap,
    fmt,
    hash::{DefaultHasher, Hash as _, Hasher as _},
};

use rama::{
    error::BoxError,
    extensions::ExtensionsRef as _,
    http::{
        HeaderMap, HeaderName, Method, Request,
        body::util::BodyExt as _,
        header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    net::stream::SocketInfo,
    telemetry::tracing,
};
use serde_json::Value;

use super::KnownContentType;

const QUERY_PARAM_ACCESS_TOKEN: &str = "access_token";

/// Parsed request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Form(serde_json::Map<String, Value>),
    /// Body of a content type which is not parsed, kept for logging only.
    Raw(String),
}

/// Immutable view on a single inbound request, with its body read and
/// parsed up front so that pipeline steps and handlers can share it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    url: String,
    path_param: Option<String>,
    query: HashMap<String, String>,
    headers: HeaderMap,
    body: RequestBody,
    client_addr: Option<String>,
}

impl RequestContext {
    pub async fn try_from_request(
        req: Request,
        path_param: Option<String>,
        max_body_size: usize,
    ) -> Result<Self, BodyRejection> {
        let client_addr = req
            .extensions()
            .get::<SocketInfo>()
            .map(|info| info.peer_addr().to_string());

        let (parts, body) = req.into_parts();

        let url = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| "/".to_owned());
        let query = parts.uri.query().map(parse_query).unwrap_or_default();

        if let Some(content_length) = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<usize>().ok())
            && content_length > max_body_size
        {
            return Err(BodyRejection::TooLarge {
                limit: max_body_size,
            });
        }

        let mut body = body;
        let mut bytes = Vec::new();
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|err| BodyRejection::Read(err.into()))?;
            let Ok(data) = frame.into_data() else {
                continue;
            };
            // a chunked body has no content-length, so bound it while reading
            if bytes.len() + data.len() > max_body_size {
                return Err(BodyRejection::TooLarge {
                    limit: max_body_size,
                });
            }
            bytes.extend_from_slice(&data);
        }

        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(KnownContentType::detect_from_header_value);
        let body = parse_body(content_type, &bytes)?;

        Ok(Self {
            method: parts.method,
            url,
            path_param,
            query,
            headers: parts.headers,
            body,
            client_addr,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path and query, as received.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Percent-decoded value of the route's path parameter, if the route has one.
    pub fn path_param(&self) -> Option<&str> {
        self.path_param.as_deref()
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(&CONTENT_TYPE)
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn body_field(&self, name: &str) -> Option<&Value> {
        match &self.body {
            RequestBody::Json(Value::Object(map)) | RequestBody::Form(map) => map.get(name),
            _ => None,
        }
    }

    pub fn client_addr(&self) -> Option<&str> {
        self.client_addr.as_deref()
    }

    /// Bearer token of the request.
    ///
    /// Looked up in the `authorization` header first, then in the
    /// `access_token` query parameter and finally in the body field
    /// of the same name.
    pub fn bearer_token(&self) -> Option<String> {
        if let Some(value) = self.header(&AUTHORIZATION)
            && let Some((scheme, token)) = value.trim().split_once(' ')
            && scheme.eq_ignore_ascii_case("bearer")
            && !token.trim().is_empty()
        {
            return Some(token.trim().to_owned());
        }

        if let Some(token) = self.query(QUERY_PARAM_ACCESS_TOKEN)
            && !token.is_empty()
        {
            return Some(token.to_owned());
        }

        match self.body_field(QUERY_PARAM_ACCESS_TOKEN)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Short hash identifying the request in audit logs,
    /// derived from the url and client address.
    pub fn request_hash(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.url.hash(&mut hasher);
        self.client_addr.hash(&mut hasher);
        let mut digest = format!("{:016x}", hasher.finish());
        digest.truncate(6);
        digest
    }

    pub fn headers_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for name in self.headers.keys() {
            let values: Vec<_> = self
                .headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect();
            map.insert(name.as_str().to_owned(), Value::String(values.join(", ")));
        }
        Value::Object(map)
    }

    /// Loggable representation of the body: arrays are summarized by length.
    pub fn body_summary(&self) -> String {
        match &self.body {
            RequestBody::Empty => "{}".to_owned(),
            RequestBody::Json(Value::Array(items)) => {
                format!("array of length {}", items.len())
            }
            RequestBody::Json(value) => value.to_string(),
            RequestBody::Form(map) => Value::Object(map.clone()).to_string(),
            RequestBody::Raw(text) => text.clone(),
        }
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    match serde_html_form::from_str::<Vec<(String, String)>>(query) {
        Ok(pairs) => {
            let mut map = HashMap::with_capacity(pairs.len());
            for (key, value) in pairs {
                map.entry(key).or_insert(value);
            }
            map
        }
        Err(err) => {
            tracing::debug!(query, "ignore malformed query string: {err}");
            HashMap::new()
        }
    }
}

fn parse_body(
    content_type: Option<KnownContentType>,
    bytes: &[u8],
) -> Result<RequestBody, BodyRejection> {
    if bytes.is_empty() {
        return Ok(RequestBody::Empty);
    }

    match content_type {
        Some(KnownContentType::Json) => serde_json::from_slice(bytes)
            .map(RequestBody::Json)
            .map_err(|err| BodyRejection::MalformedJson(err.to_string())),
        Some(KnownContentType::Form) => {
            let pairs = serde_html_form::from_bytes::<Vec<(String, String)>>(bytes)
                .map_err(|err| BodyRejection::MalformedForm(err.to_string()))?;
            let mut map = serde_json::Map::new();
            for (key, value) in pairs {
                map.entry(key).or_insert(Value::String(value));
            }
            Ok(RequestBody::Form(map))
        }
        None => Ok(RequestBody::Raw(String::from_utf8_lossy(bytes).into_owned())),
    }
}

/// Reasons a request body could not be turned into a [`RequestContext`].
#[derive(Debug)]
pub enum BodyRejection {
    TooLarge { limit: usize },
    MalformedJson(String),
    MalformedForm(String),
    Read(BoxError),
}

impl fmt::Display for BodyRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge { limit } => {
                write!(f, "request body exceeds the limit of {limit} bytes")
            }
            Self::MalformedJson(err) => write!(f, "malformed json body: {err}"),
            Self::MalformedForm(err) => write!(f, "malformed form body: {err}"),
            Self::Read(err) => write!(f, "failed to read request body: {err}"),
        }
    }
}

impl std::error::Error for BodyRejection {}

#[cfg(test)]
mod tests {
    use rama::{
        bytes::Bytes,
        futures::stream,
        http::{Body, HeaderValue, Uri},
    };
    use serde_json::json;

    use super::*;

    const LIMIT: usize = 1024;

    async fn new_ctx(uri: &str, headers: &[(HeaderName, &str)], body: &str) -> RequestContext {
        try_ctx(uri, headers, body).await.unwrap()
    }

    async fn try_ctx(
        uri: &str,
        headers: &[(HeaderName, &str)],
        body: &str,
    ) -> Result<RequestContext, BodyRejection> {
        let mut req = Request::new(Body::from(body.to_owned()));
        *req.uri_mut() = uri.parse::<Uri>().unwrap();
        for (name, value) in headers {
            req.headers_mut()
                .insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        RequestContext::try_from_request(req, None, LIMIT).await
    }

    #[tokio::test]
    async fn test_query_first_value_wins() {
        let ctx = new_ctx("/status/200?delay=10&delay=20&authTimeout=5", &[], "").await;
        assert_eq!(ctx.query("delay"), Some("10"));
        assert_eq!(ctx.query("authTimeout"), Some("5"));
        assert_eq!(ctx.query("missing"), None);
        assert_eq!(ctx.url(), "/status/200?delay=10&delay=20&authTimeout=5");
    }

    #[tokio::test]
    async fn test_json_body() {
        let ctx = new_ctx(
            "/logged/200",
            &[(CONTENT_TYPE, "application/json")],
            r#"{"expires_in":3600,"grant_type":"client_credentials"}"#,
        )
        .await;
        assert_eq!(ctx.body_field("expires_in"), Some(&json!(3600)));
        assert_eq!(
            ctx.body_field("grant_type"),
            Some(&json!("client_credentials"))
        );
    }

    #[tokio::test]
    async fn test_json_array_body_summary() {
        let ctx = new_ctx(
            "/logged/200",
            &[(CONTENT_TYPE, "application/json")],
            r#"[{"msys":{}},{"msys":{}}]"#,
        )
        .await;
        assert_eq!(ctx.body_summary(), "array of length 2");
        assert_eq!(ctx.body_field("msys"), None);
    }

    #[tokio::test]
    async fn test_form_body() {
        let ctx = new_ctx(
            "/token",
            &[(CONTENT_TYPE, KnownContentType::FORM_URLENCODED)],
            "grant_type=client_credentials&expires_in=3600",
        )
        .await;
        assert_eq!(ctx.body_field("expires_in"), Some(&json!("3600")));
        assert_eq!(ctx.content_type(), Some(KnownContentType::FORM_URLENCODED));
    }

    #[tokio::test]
    async fn test_raw_and_empty_body() {
        let ctx = new_ctx("/", &[(CONTENT_TYPE, "text/plain")], "hello").await;
        assert_eq!(ctx.body(), &RequestBody::Raw("hello".to_owned()));

        let ctx = new_ctx("/", &[(CONTENT_TYPE, "application/json")], "").await;
        assert_eq!(ctx.body(), &RequestBody::Empty);
        assert_eq!(ctx.body_summary(), "{}");
    }

    #[tokio::test]
    async fn test_malformed_json_rejected() {
        let err = try_ctx("/", &[(CONTENT_TYPE, "application/json")], "{oops")
            .await
            .unwrap_err();
        assert!(matches!(err, BodyRejection::MalformedJson(_)), "{err}");
    }

    #[tokio::test]
    async fn test_body_limit() {
        let body = "x".repeat(LIMIT + 1);
        let err = try_ctx("/", &[], &body).await.unwrap_err();
        assert!(matches!(err, BodyRejection::TooLarge { limit: LIMIT }), "{err}");

        let body = "x".repeat(LIMIT);
        assert!(try_ctx("/", &[], &body).await.is_ok());
    }

    #[tokio::test]
    async fn test_endless_chunked_body_stops_at_limit() {
        let chunks = std::iter::repeat_with(|| Ok::<_, BoxError>(Bytes::from_static(&[b'x'; 64])));
        let req = Request::new(Body::from_stream(stream::iter(chunks)));
        let err = RequestContext::try_from_request(req, None, LIMIT)
            .await
            .unwrap_err();
        assert!(matches!(err, BodyRejection::TooLarge { limit: LIMIT }), "{err}");
    }

    #[tokio::test]
    async fn test_bearer_token_lookup_order() {
        let ctx = new_ctx(
            "/logged?access_token=from-query",
            &[(AUTHORIZATION, "Bearer from-header")],
            "",
        )
        .await;
        assert_eq!(ctx.bearer_token().as_deref(), Some("from-header"));

        let ctx = new_ctx(
            "/logged?access_token=from-query",
            &[(AUTHORIZATION, "Basic Zm9vOmJhcg==")],
            "",
        )
        .await;
        assert_eq!(ctx.bearer_token().as_deref(), Some("from-query"));

        let ctx = new_ctx(
            "/logged",
            &[(CONTENT_TYPE, "application/json")],
            r#"{"access_token":1700000000000}"#,
        )
        .await;
        assert_eq!(ctx.bearer_token().as_deref(), Some("1700000000000"));

        let ctx = new_ctx("/logged", &[(AUTHORIZATION, "bearer   ")], "").await;
        assert_eq!(ctx.bearer_token(), None);
    }

    #[tokio::test]
    async fn test_request_hash_is_short_and_stable() {
        let a = new_ctx("/logged/200?x=1", &[], "").await;
        let b = new_ctx("/logged/200?x=1", &[], "").await;
        let c = new_ctx("/logged/200?x=2", &[], "").await;
        assert_eq!(a.request_hash().len(), 6);
        assert_eq!(a.request_hash(), b.request_hash());
        assert_ne!(a.request_hash(), c.request_hash());
    }

    #[tokio::test]
    async fn test_headers_json() {
        let ctx = new_ctx("/", &[(CONTENT_TYPE, "text/plain")], "").await;
        assert_eq!(ctx.headers_json(), json!({ "content-type": "text/plain" }));
    }
}
