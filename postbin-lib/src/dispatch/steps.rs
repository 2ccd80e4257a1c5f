use rama::{
    http::{Response, StatusCode},
    telemetry::tracing,
    utils::time::now_unix_ms,
};

use crate::{
    http::{RequestContext, headers::HEADER_NAME_X_BATCH_ID, response},
    pipeline::Step,
    simulate::{DelaySpec, Freshness, FreshnessCheck, OutcomeTable, Selection},
};

/// Result of a single pipeline step.
#[derive(Debug)]
pub enum StepOutcome {
    /// Continue with the next step, or the route handler.
    Next,
    /// Answer the request with this response, skipping everything after.
    Respond(Response),
}

pub(super) async fn run(step: Step, ctx: &RequestContext) -> StepOutcome {
    match step {
        Step::LogHeader => log_header(ctx),
        Step::Delay => delay(ctx).await,
        Step::BadResponses => bad_responses(ctx),
        Step::AuthTimeout => auth_timeout(ctx, now_unix_ms()),
    }
}

fn log_header(ctx: &RequestContext) -> StepOutcome {
    tracing::info!(
        request.hash = %ctx.request_hash(),
        client.addr = ctx.client_addr().unwrap_or("-"),
        url = ctx.url(),
        "incoming logged request",
    );
    StepOutcome::Next
}

async fn delay(ctx: &RequestContext) -> StepOutcome {
    if let Some(spec) = DelaySpec::parse_lossy(ctx.query(DelaySpec::QUERY_PARAM)) {
        let delay = spec.resolve();
        tracing::info!("Delay for {}ms", delay.as_millis());
        tokio::time::sleep(delay).await;
    }
    StepOutcome::Next
}

fn bad_responses(ctx: &RequestContext) -> StepOutcome {
    match OutcomeTable::parse_lossy(ctx.query(OutcomeTable::QUERY_PARAM)).select() {
        Selection::Status(status) => {
            tracing::info!(%status, "bad response drawn");
            StepOutcome::Respond(response::status_only(status))
        }
        Selection::PassThrough => StepOutcome::Next,
    }
}

fn auth_timeout(ctx: &RequestContext, now_ms: i64) -> StepOutcome {
    let check = FreshnessCheck::from_query_value(ctx.query(FreshnessCheck::QUERY_PARAM));
    if !check.is_requested() {
        return StepOutcome::Next;
    }

    if let Some(batch_id) = ctx.header(&HEADER_NAME_X_BATCH_ID) {
        tracing::info!(batch_id, "x-messagesystems-batch-id");
    }

    match check.evaluate(ctx.bearer_token().as_deref(), now_ms) {
        Freshness::NotRequested => StepOutcome::Next,
        Freshness::Fresh { remaining_ms } => {
            tracing::info!(remaining_ms, "token still fresh");
            StepOutcome::Next
        }
        Freshness::Missing => {
            tracing::info!("no token included in request, responding with 400");
            StepOutcome::Respond(response::json_error(
                StatusCode::BAD_REQUEST,
                "no access_token",
            ))
        }
        Freshness::Expired { token } => {
            tracing::info!(token, "invalid or expired token, responding with 401");
            StepOutcome::Respond(response::json_error(
                StatusCode::UNAUTHORIZED,
                format!("invalid or expired token: {token}"),
            ))
        }
    }
}
