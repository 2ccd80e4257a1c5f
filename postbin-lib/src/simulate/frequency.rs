use std::{num::ParseIntError, str::FromStr};

use rama::http::StatusCode;

/// Fails roughly one in `N` requests.
///
/// A draw fails when `sample * N < 1`. For `N <= 0` that comparison
/// always holds, meaning such a frequency fails every single request.
/// This degenerate case is kept as is, callers rely on `0` meaning
/// "always fail".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureFrequency(i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyOutcome {
    Fail,
    Succeed,
}

impl FrequencyOutcome {
    pub fn status(self) -> StatusCode {
        match self {
            Self::Fail => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Succeed => StatusCode::OK,
        }
    }
}

impl FailureFrequency {
    #[inline(always)]
    pub const fn new(n: i64) -> Self {
        Self(n)
    }

    #[inline(always)]
    pub const fn get(self) -> i64 {
        self.0
    }

    pub fn draw(self) -> FrequencyOutcome {
        self.draw_with_sample(rand::random())
    }

    /// Decide the outcome for a uniform sample in `[0, 1)`.
    pub fn draw_with_sample(self, sample: f64) -> FrequencyOutcome {
        if sample * (self.0 as f64) < 1. {
            FrequencyOutcome::Fail
        } else {
            FrequencyOutcome::Succeed
        }
    }
}

impl FromStr for FailureFrequency {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}
