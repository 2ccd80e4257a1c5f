use std::{fmt, str::FromStr, time::Duration};

use rama::telemetry::tracing;

/// Requested latency for a single response, in milliseconds.
///
/// Accepted forms are `"500"` (fixed) and `"500-1500"` (uniform draw
/// within the half-open range `[500, 1500)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelaySpec {
    Fixed(u64),
    Range { lo: u64, hi: u64 },
}

impl DelaySpec {
    pub const QUERY_PARAM: &'static str = "delay";

    pub fn parse(text: &str) -> Result<Self, DelaySpecParseError> {
        text.parse()
    }

    /// Parse an optional raw delay value, failing open.
    ///
    /// Absent or malformed input yields `None`, which callers treat as
    /// "no delay". Malformed input is logged, never surfaced to the client.
    pub fn parse_lossy(raw: Option<&str>) -> Option<Self> {
        let raw = raw?;
        match raw.parse() {
            Ok(spec) => Some(spec),
            Err(err) => {
                tracing::warn!(delay = raw, "ignore malformed delay: {err}");
                None
            }
        }
    }

    /// Resolve into a concrete wait using the process-wide rng.
    pub fn resolve(&self) -> Duration {
        let ms = match *self {
            Self::Fixed(ms) => ms,
            Self::Range { lo, hi } => rand::random_range(lo..hi),
        };
        Duration::from_millis(ms)
    }

    /// Resolve using a caller provided uniform sample in `[0, 1)`.
    pub fn resolve_with_sample(&self, sample: f64) -> Duration {
        let ms = match *self {
            Self::Fixed(ms) => ms,
            Self::Range { lo, hi } => {
                let span = hi - lo;
                let offset = (sample.clamp(0., 1.) * span as f64) as u64;
                lo + offset.min(span - 1)
            }
        };
        Duration::from_millis(ms)
    }
}

impl FromStr for DelaySpec {
    type Err = DelaySpecParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let input = text.trim();
        if input.is_empty() {
            return Err(DelaySpecParseError::EmptyString);
        }

        let Some((lo, hi)) = input.split_once('-') else {
            return parse_millis(input).map(Self::Fixed);
        };

        let lo = parse_millis(lo)?;
        let hi = parse_millis(hi)?;

        // an inverted range is swapped, an empty range collapses to its bound
        Ok(match lo.cmp(&hi) {
            std::cmp::Ordering::Less => Self::Range { lo, hi },
            std::cmp::Ordering::Equal => Self::Fixed(lo),
            std::cmp::Ordering::Greater => Self::Range { lo: hi, hi: lo },
        })
    }
}

impl fmt::Display for DelaySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(ms) => write!(f, "{ms}"),
            Self::Range { lo, hi } => write!(f, "{lo}-{hi}"),
        }
    }
}

fn parse_millis(text: &str) -> Result<u64, DelaySpecParseError> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DelaySpecParseError::InvalidNumber(text.to_owned()));
    }
    text.parse()
        .map_err(|_| DelaySpecParseError::InvalidNumber(text.to_owned()))
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub enum DelaySpecParseError {
    EmptyString,
    InvalidNumber(String),
}

impl fmt::Display for DelaySpecParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyString => write!(f, "DelaySpecParseError: empty string"),
            Self::InvalidNumber(text) => write!(
                f,
                "DelaySpecParseError: '{text}' is not a non-negative amount of milliseconds"
            ),
        }
    }
}

impl std::error::Error for DelaySpecParseError {}
