use rama::http::{
    Response, StatusCode,
    service::web::response::{IntoResponse, Json},
};
use serde_json::json;

const GENERIC_FAILURE_MESSAGE: &str = "Something broke!";

/// Status with an empty JSON object as body, the default answer of postbin.
pub fn empty_json(status: StatusCode) -> Response {
    (status, Json(json!({}))).into_response()
}

/// Status without any body, used for simulated bad responses.
pub fn status_only(status: StatusCode) -> Response {
    status.into_response()
}

pub fn json_error(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(json!({ "error": error.into() }))).into_response()
}

pub fn json(status: StatusCode, value: serde_json::Value) -> Response {
    (status, Json(value)).into_response()
}

pub fn plain_text(status: StatusCode, text: impl Into<String>) -> Response {
    (status, text.into()).into_response()
}

/// Last resort answer for faults which escaped the handlers.
pub fn internal_error() -> Response {
    plain_text(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE_MESSAGE)
}

pub fn not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "not found")
}
