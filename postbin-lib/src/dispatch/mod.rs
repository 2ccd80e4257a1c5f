use std::convert::Infallible;

use rama::{
    Service,
    error::{BoxError, ErrorContext as _},
    http::{Method, Request, Response, StatusCode},
    telemetry::tracing,
};

use crate::{
    http::{BodyRejection, RequestContext, response},
    pipeline::{Profile, Route, RouteMatch, RouteTable},
    token::{TokenIssuer, TokenIssuerConfig},
};

mod handlers;
mod steps;

pub use steps::StepOutcome;

/// Default limit for request bodies: 50 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub routes: RouteTable,
    pub token: TokenIssuerConfig,
    pub max_body_size: usize,
}

impl ServiceConfig {
    pub fn for_profile(profile: Profile) -> Self {
        Self {
            routes: profile.route_table(),
            token: profile.token_config(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::for_profile(Profile::default())
    }
}

/// Dispatches every request to one of the fixed routes,
/// running the route's configured steps before its handler.
///
/// Faults never escape: they are logged and answered with a generic 500.
#[derive(Debug, Clone)]
pub struct PostbinService {
    routes: RouteTable,
    token_issuer: TokenIssuer,
    max_body_size: usize,
}

impl PostbinService {
    pub fn new(cfg: ServiceConfig) -> Self {
        Self {
            routes: cfg.routes,
            token_issuer: TokenIssuer::new(cfg.token),
            max_body_size: cfg.max_body_size,
        }
    }

    async fn handle(&self, req: Request) -> Result<Response, BoxError> {
        let Some(RouteMatch { route, param }) = Route::match_path(req.uri().path()) else {
            tracing::debug!(path = req.uri().path(), "no route matched");
            return Ok(response::not_found());
        };

        if route == Route::Token && req.method() != Method::POST {
            return Ok(response::json_error(
                StatusCode::METHOD_NOT_ALLOWED,
                "method not allowed",
            ));
        }

        let ctx = match RequestContext::try_from_request(req, param, self.max_body_size).await {
            Ok(ctx) => ctx,
            Err(BodyRejection::Read(err)) => {
                return Err(err).context("read request body");
            }
            Err(rejection @ BodyRejection::TooLarge { .. }) => {
                tracing::debug!(%route, "reject request: {rejection}");
                return Ok(response::json_error(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    rejection.to_string(),
                ));
            }
            Err(rejection) => {
                tracing::debug!(%route, "reject request: {rejection}");
                return Ok(response::json_error(
                    StatusCode::BAD_REQUEST,
                    rejection.to_string(),
                ));
            }
        };

        for step in self.routes.steps(route) {
            if let StepOutcome::Respond(resp) = steps::run(*step, &ctx).await {
                tracing::debug!(%route, %step, "step short-circuited the request");
                return Ok(resp);
            }
        }

        handlers::handle(route, &ctx, &self.token_issuer)
            .await
            .context("handle route")
            .context_field("route", route)
    }
}

impl Service<Request> for PostbinService {
    type Output = Response;
    type Error = Infallible;

    async fn serve(&self, req: Request) -> Result<Self::Output, Self::Error> {
        Ok(match self.handle(req).await {
            Ok(resp) => resp,
            Err(err) => {
                tracing::error!("request failed: {err:?}");
                response::internal_error()
            }
        })
    }
}
