use std::time::Duration;

use rama::{
    error::{BoxError, ErrorContext as _},
    http::{Response, StatusCode},
    telemetry::tracing,
};
use serde_json::json;

use crate::{
    http::{
        RequestContext,
        headers::{HEADER_NAME_X_DELAY, HEADER_NAME_X_STATUS, HEADER_NAME_X_WEBHOOK_TOKEN},
        response,
    },
    pipeline::Route,
    simulate::{DelaySpec, FailureFrequency},
    token::TokenIssuer,
};

pub(super) async fn handle(
    route: Route,
    ctx: &RequestContext,
    token_issuer: &TokenIssuer,
) -> Result<Response, BoxError> {
    match route {
        Route::Root => root(ctx).await,
        Route::Wildcard => wildcard(ctx),
        Route::Status => status(ctx),
        Route::Logged | Route::LoggedIndex => logged(ctx),
        Route::Auth => auth(ctx),
        Route::Slow => slow(ctx).await,
        Route::Delay => delay(ctx).await,
        Route::Token => Ok(token_issuer.respond(ctx)),
    }
}

fn path_param(ctx: &RequestContext) -> Result<&str, BoxError> {
    ctx.path_param()
        .context("route matched without its path parameter")
}

fn parse_status_code(raw: &str) -> Option<StatusCode> {
    raw.trim()
        .parse::<u16>()
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
}

fn invalid_param(what: &str, raw: &str) -> Response {
    response::json_error(StatusCode::BAD_REQUEST, format!("invalid {what}: {raw}"))
}

async fn root(ctx: &RequestContext) -> Result<Response, BoxError> {
    let status = match ctx.header(&HEADER_NAME_X_STATUS) {
        None => StatusCode::OK,
        Some(raw) => match parse_status_code(raw) {
            Some(status) => status,
            None => return Ok(invalid_param("x-status", raw)),
        },
    };

    if let Some(spec) = DelaySpec::parse_lossy(ctx.header(&HEADER_NAME_X_DELAY)) {
        let delay = spec.resolve();
        tracing::debug!("Delay for {}ms", delay.as_millis());
        tokio::time::sleep(delay).await;
    }

    Ok(response::empty_json(status))
}

fn wildcard(ctx: &RequestContext) -> Result<Response, BoxError> {
    let raw = path_param(ctx)?;
    let Ok(freq) = raw.parse::<FailureFrequency>() else {
        return Ok(invalid_param("frequency", raw));
    };
    Ok(response::empty_json(freq.draw().status()))
}

fn status(ctx: &RequestContext) -> Result<Response, BoxError> {
    let raw = path_param(ctx)?;
    Ok(match parse_status_code(raw) {
        Some(status) => response::empty_json(status),
        None => invalid_param("status code", raw),
    })
}

fn logged(ctx: &RequestContext) -> Result<Response, BoxError> {
    let status = match ctx.path_param() {
        None => StatusCode::OK,
        Some(raw) => match parse_status_code(raw) {
            Some(status) => status,
            None => return Ok(invalid_param("status code", raw)),
        },
    };

    tracing::info!(headers = %ctx.headers_json(), "logged request headers");
    tracing::info!(body = %ctx.body_summary(), "logged request body");

    Ok(response::empty_json(status))
}

fn auth(ctx: &RequestContext) -> Result<Response, BoxError> {
    let expected = path_param(ctx)?;
    let provided = ctx.header(&HEADER_NAME_X_WEBHOOK_TOKEN);
    if provided == Some(expected) {
        return Ok(response::empty_json(StatusCode::OK));
    }

    tracing::error!(?provided, "bad auth");
    Ok(response::empty_json(StatusCode::UNAUTHORIZED))
}

async fn slow(ctx: &RequestContext) -> Result<Response, BoxError> {
    let raw = path_param(ctx)?;
    let Ok(average_ms) = raw.trim().parse::<u64>() else {
        return Ok(invalid_param("average time", raw));
    };

    let upper = average_ms.saturating_mul(2);
    let waited_ms = if upper == 0 {
        0
    } else {
        rand::random_range(0..upper)
    };
    tokio::time::sleep(Duration::from_millis(waited_ms)).await;

    Ok(response::json(
        StatusCode::OK,
        json!({ "message": format!("Waited {waited_ms}ms") }),
    ))
}

async fn delay(ctx: &RequestContext) -> Result<Response, BoxError> {
    let raw = path_param(ctx)?;
    let Ok(delay_ms) = raw.trim().parse::<u64>() else {
        return Ok(invalid_param("delay time", raw));
    };

    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    Ok(response::empty_json(StatusCode::OK))
}
