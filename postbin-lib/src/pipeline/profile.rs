use std::{fmt, str::FromStr};

use super::{Pipeline, Route, RouteTable, Step};
use crate::token::{ContentTypePolicy, TokenIssuerConfig};

/// Known route table variants of the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Profile {
    /// Bare routes without any middleware steps, strict token endpoint.
    Plain,
    /// Latest known variant.
    #[default]
    Current,
    /// Auth timeouts on every status route and a lenient token endpoint
    /// which echoes `token_type` and honours a supplied `access_token`.
    Extended,
}

impl Profile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Current => "current",
            Self::Extended => "extended",
        }
    }

    pub fn route_table(self) -> RouteTable {
        use Step::*;

        match self {
            Self::Plain => RouteTable::default(),
            Self::Current => RouteTable::default()
                .with_pipeline(Route::Status, Pipeline::new([Delay]))
                .with_pipeline(Route::Logged, Pipeline::new([LogHeader, Delay]))
                .with_pipeline(
                    Route::LoggedIndex,
                    Pipeline::new([LogHeader, Delay, BadResponses, AuthTimeout]),
                )
                .with_pipeline(
                    Route::Token,
                    Pipeline::new([LogHeader, Delay, BadResponses]),
                ),
            Self::Extended => RouteTable::default()
                .with_pipeline(Route::Status, Pipeline::new([Delay, AuthTimeout]))
                .with_pipeline(
                    Route::Logged,
                    Pipeline::new([LogHeader, Delay, AuthTimeout]),
                )
                .with_pipeline(
                    Route::LoggedIndex,
                    Pipeline::new([LogHeader, Delay, BadResponses, AuthTimeout]),
                )
                .with_pipeline(
                    Route::Token,
                    Pipeline::new([LogHeader, Delay, BadResponses]),
                ),
        }
    }

    pub fn token_config(self) -> TokenIssuerConfig {
        match self {
            Self::Plain | Self::Current => TokenIssuerConfig::default(),
            Self::Extended => TokenIssuerConfig {
                content_type: ContentTypePolicy::Lenient,
                echo_token_type: true,
                allow_token_override: true,
            },
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = ProfileParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "plain" => Ok(Self::Plain),
            "current" => Ok(Self::Current),
            "extended" => Ok(Self::Extended),
            other => Err(ProfileParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileParseError(String);

impl fmt::Display for ProfileParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProfileParseError: unknown profile '{}'", self.0)
    }
}

impl std::error::Error for ProfileParseError {}
