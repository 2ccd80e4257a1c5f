use rama::telemetry::tracing;

/// Checks a bearer token, interpreted as its issue time in unix
/// milliseconds, against a caller supplied timeout.
///
/// Nothing about the token is stored: each request is evaluated on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreshnessCheck {
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// No timeout was requested, the token (if any) is not inspected.
    NotRequested,
    /// Token is within the timeout.
    Fresh { remaining_ms: i64 },
    /// Timeout requested but the request carries no token.
    Missing,
    /// Token is older than the timeout, or not a timestamp at all.
    Expired { token: String },
}

impl Freshness {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::NotRequested | Self::Fresh { .. })
    }
}

impl FreshnessCheck {
    pub const QUERY_PARAM: &'static str = "authTimeout";

    pub const fn new(timeout_ms: Option<u64>) -> Self {
        Self { timeout_ms }
    }

    /// Build the check from the raw query value.
    ///
    /// A value which is not a non-negative integer disables the check.
    pub fn from_query_value(raw: Option<&str>) -> Self {
        let timeout_ms = raw
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| match s.parse() {
                Ok(ms) => Some(ms),
                Err(err) => {
                    tracing::warn!(auth_timeout = s, "ignore invalid auth timeout: {err}");
                    None
                }
            });
        Self { timeout_ms }
    }

    pub fn timeout_ms(&self) -> Option<u64> {
        self.timeout_ms
    }

    pub fn is_requested(&self) -> bool {
        self.timeout_ms.is_some()
    }

    pub fn evaluate(&self, token: Option<&str>, now_ms: i64) -> Freshness {
        let Some(timeout_ms) = self.timeout_ms else {
            return Freshness::NotRequested;
        };

        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return Freshness::Missing;
        };

        let Ok(issued_at_ms) = token.parse::<i64>() else {
            return Freshness::Expired {
                token: token.to_owned(),
            };
        };

        let elapsed_ms = now_ms.saturating_sub(issued_at_ms);
        let timeout_ms = i64::try_from(timeout_ms).unwrap_or(i64::MAX);
        if elapsed_ms > timeout_ms {
            Freshness::Expired {
                token: token.to_owned(),
            }
        } else {
            Freshness::Fresh {
                remaining_ms: timeout_ms.saturating_sub(elapsed_ms),
            }
        }
    }
}
