use std::{fmt, str::FromStr};

use rama::{http::StatusCode, telemetry::tracing};

/// Ordered table of `(status code, probability)` pairs used to simulate
/// a flaky downstream.
///
/// Probabilities are not required to sum up to one, nor to stay below it:
/// any finite weight `>= 0` is accepted. Selection walks the table in order
/// with a running total, the first entry whose running total reaches the
/// draw wins, so a weight of one or more always wins once reached.
///
/// Two serialized forms are accepted:
///
/// - `400:0.1,401:0.25` (entries kept in the given order);
/// - `{"400":0.1,"401":0.25}` (entries walked in key order).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutcomeTable {
    entries: Vec<(StatusCode, f64)>,
}

/// Result of drawing from an [`OutcomeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Short-circuit the request with this status and an empty body.
    Status(StatusCode),
    /// Nothing was drawn, continue with the next stage.
    PassThrough,
}

impl OutcomeTable {
    pub const QUERY_PARAM: &'static str = "badResponses";

    pub fn parse(text: &str) -> Result<Self, OutcomeTableParseError> {
        text.parse()
    }

    /// Parse an optional raw table, where absence and parse failures
    /// both result in an empty table (which always passes through).
    pub fn parse_lossy(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        match raw.parse() {
            Ok(table) => table,
            Err(err) => {
                tracing::info!(bad_responses = raw, "could not parse bad responses: {err}");
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(StatusCode, f64)] {
        &self.entries
    }

    /// Draw an outcome using the process-wide rng.
    pub fn select(&self) -> Selection {
        if self.entries.is_empty() {
            return Selection::PassThrough;
        }
        self.select_with_sample(rand::random())
    }

    /// Draw an outcome for a uniform sample in `[0, 1)`.
    pub fn select_with_sample(&self, sample: f64) -> Selection {
        let mut total = 0.;
        for (status, probability) in &self.entries {
            total += probability;
            if sample <= total {
                return Selection::Status(*status);
            }
        }
        Selection::PassThrough
    }

    fn insert(&mut self, status: StatusCode, probability: f64) {
        // a repeated code keeps its first position, the last weight wins
        match self.entries.iter_mut().find(|(code, _)| *code == status) {
            Some(entry) => entry.1 = probability,
            None => self.entries.push((status, probability)),
        }
    }

    fn parse_pairs(input: &str) -> Result<Self, OutcomeTableParseError> {
        let mut table = Self::default();
        for item in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (code, probability) = item
                .split_once(':')
                .ok_or_else(|| OutcomeTableParseError::InvalidEntry(item.to_owned()))?;
            table.insert(parse_status(code)?, parse_probability(probability)?);
        }
        Ok(table)
    }

    fn parse_json(input: &str) -> Result<Self, OutcomeTableParseError> {
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(input)
            .map_err(|err| OutcomeTableParseError::InvalidJson(err.to_string()))?;

        let mut entries = Vec::with_capacity(object.len());
        for (code, value) in object {
            entries.push((parse_status(&code)?, value));
        }
        entries.sort_by_key(|(status, _)| status.as_u16());

        let mut table = Self::default();
        for (status, value) in entries {
            let probability = match &value {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }
            .ok_or_else(|| OutcomeTableParseError::InvalidProbability(value.to_string()))?;
            table.insert(status, check_probability(probability, &value.to_string())?);
        }
        Ok(table)
    }
}

impl FromStr for OutcomeTable {
    type Err = OutcomeTableParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let input = text.trim();
        if input.starts_with('{') {
            Self::parse_json(input)
        } else {
            Self::parse_pairs(input)
        }
    }
}

fn parse_status(text: &str) -> Result<StatusCode, OutcomeTableParseError> {
    let text = text.trim();
    text.parse::<u16>()
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| OutcomeTableParseError::InvalidStatusCode(text.to_owned()))
}

fn parse_probability(text: &str) -> Result<f64, OutcomeTableParseError> {
    let text = text.trim();
    let probability = text
        .parse::<f64>()
        .map_err(|_| OutcomeTableParseError::InvalidProbability(text.to_owned()))?;
    check_probability(probability, text)
}

fn check_probability(probability: f64, raw: &str) -> Result<f64, OutcomeTableParseError> {
    if probability.is_finite() && probability >= 0. {
        Ok(probability)
    } else {
        Err(OutcomeTableParseError::InvalidProbability(raw.to_owned()))
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub enum OutcomeTableParseError {
    InvalidEntry(String),
    InvalidStatusCode(String),
    InvalidProbability(String),
    InvalidJson(String),
}

impl fmt::Display for OutcomeTableParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEntry(entry) => write!(
                f,
                "OutcomeTableParseError: entry '{entry}' is not of the form <code>:<probability>"
            ),
            Self::InvalidStatusCode(code) => {
                write!(f, "OutcomeTableParseError: invalid status code '{code}'")
            }
            Self::InvalidProbability(p) => write!(
                f,
                "OutcomeTableParseError: probability '{p}' is not a finite number >= 0"
            ),
            Self::InvalidJson(err) => write!(f, "OutcomeTableParseError: invalid json: {err}"),
        }
    }
}

impl std::error::Error for OutcomeTableParseError {}
