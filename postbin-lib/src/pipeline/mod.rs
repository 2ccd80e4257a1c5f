//! Route table of postbin: which path maps to which behaviour,
//! and which ordered middleware steps run before it.
//!
//! Historical variants of the service only differ in these step lists,
//! see [`Profile`] for the known ones.

use std::{collections::HashMap, fmt, str::FromStr};

use rama::net::uri::util::percent_encoding::percent_decode_str;

mod profile;
pub use profile::{Profile, ProfileParseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// `/`, driven by the `x-delay` and `x-status` headers.
    Root,
    /// `/wildcard/{freq}`
    Wildcard,
    /// `/status/{code}`
    Status,
    /// `/logged/{code}`
    Logged,
    /// `/logged` without a status code.
    LoggedIndex,
    /// `/auth/{code}`
    Auth,
    /// `/slow/{avgMs}`
    Slow,
    /// `/delay/{ms}`
    Delay,
    /// `POST /token`
    Token,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub route: Route,
    /// Percent-decoded path parameter, for the routes which take one.
    pub param: Option<String>,
}

impl Route {
    pub const ALL: [Self; 9] = [
        Self::Root,
        Self::Wildcard,
        Self::Status,
        Self::Logged,
        Self::LoggedIndex,
        Self::Auth,
        Self::Slow,
        Self::Delay,
        Self::Token,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Wildcard => "wildcard",
            Self::Status => "status",
            Self::Logged => "logged",
            Self::LoggedIndex => "logged-index",
            Self::Auth => "auth",
            Self::Slow => "slow",
            Self::Delay => "delay",
            Self::Token => "token",
        }
    }

    /// Match a request path against the fixed route set.
    ///
    /// Segments after the path parameter are accepted and ignored,
    /// e.g. `/status/503/anything` matches [`Route::Status`] with `503`.
    pub fn match_path(path: &str) -> Option<RouteMatch> {
        let Some(rest) = path.strip_prefix('/') else {
            return None;
        };
        if rest.is_empty() {
            return Some(RouteMatch {
                route: Self::Root,
                param: None,
            });
        }

        let mut segments = rest.splitn(3, '/');
        let name = segments.next().unwrap_or_default();
        let param = segments
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned());
        let has_trailing = segments.next().is_some();

        let route = match name {
            "token" if param.is_none() && !has_trailing => Self::Token,
            "logged" if param.is_none() && !has_trailing => Self::LoggedIndex,
            "logged" => Self::Logged,
            "wildcard" => Self::Wildcard,
            "status" => Self::Status,
            "auth" => Self::Auth,
            "slow" => Self::Slow,
            "delay" => Self::Delay,
            _ => return None,
        };

        if route.takes_param() && param.is_none() {
            return None;
        }

        Some(RouteMatch { route, param })
    }

    pub fn takes_param(self) -> bool {
        !matches!(self, Self::Root | Self::LoggedIndex | Self::Token)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Route {
    type Err = PipelineParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|route| route.as_str() == s)
            .ok_or_else(|| PipelineParseError::UnknownRoute(s.to_owned()))
    }
}

/// Named middleware step, run in order before a route's handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Audit line with a short request hash.
    LogHeader,
    /// Wait as requested by the `delay` query parameter.
    Delay,
    /// Answer with a weighted random status from `badResponses`.
    BadResponses,
    /// Reject stale bearer tokens when `authTimeout` is given.
    AuthTimeout,
}

impl Step {
    pub const ALL: [Self; 4] = [
        Self::LogHeader,
        Self::Delay,
        Self::BadResponses,
        Self::AuthTimeout,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LogHeader => "log-header",
            Self::Delay => "delay",
            Self::BadResponses => "bad-responses",
            Self::AuthTimeout => "auth-timeout",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = PipelineParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| PipelineParseError::UnknownStep(s.to_owned()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline(Vec<Step>);

impl Pipeline {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self(steps.into_iter().collect())
    }

    pub fn steps(&self) -> &[Step] {
        &self.0
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, step) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            step.fmt(f)?;
        }
        Ok(())
    }
}

impl FromStr for Pipeline {
    type Err = PipelineParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Step::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

/// `route=step,step` as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOverride {
    pub route: Route,
    pub pipeline: Pipeline,
}

impl FromStr for PipelineOverride {
    type Err = PipelineParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (route, steps) = s
            .split_once('=')
            .ok_or_else(|| PipelineParseError::MissingSeparator(s.to_owned()))?;
        Ok(Self {
            route: route.parse()?,
            pipeline: steps.parse()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineParseError {
    UnknownRoute(String),
    UnknownStep(String),
    MissingSeparator(String),
}

impl fmt::Display for PipelineParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRoute(s) => write!(f, "PipelineParseError: unknown route '{s}'"),
            Self::UnknownStep(s) => write!(f, "PipelineParseError: unknown step '{s}'"),
            Self::MissingSeparator(s) => {
                write!(f, "PipelineParseError: expected <route>=<steps>, got '{s}'")
            }
        }
    }
}

impl std::error::Error for PipelineParseError {}

/// Ordered steps per route. Routes without an entry run no steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    pipelines: HashMap<Route, Pipeline>,
}

impl RouteTable {
    pub fn for_profile(profile: Profile) -> Self {
        profile.route_table()
    }

    pub fn set_pipeline(&mut self, route: Route, pipeline: Pipeline) -> &mut Self {
        self.pipelines.insert(route, pipeline);
        self
    }

    pub fn with_pipeline(mut self, route: Route, pipeline: Pipeline) -> Self {
        self.set_pipeline(route, pipeline);
        self
    }

    pub fn apply_override(&mut self, pipeline_override: PipelineOverride) -> &mut Self {
        self.set_pipeline(pipeline_override.route, pipeline_override.pipeline)
    }

    pub fn steps(&self, route: Route) -> &[Step] {
        self.pipelines
            .get(&route)
            .map(Pipeline::steps)
            .unwrap_or_default()
    }
}
