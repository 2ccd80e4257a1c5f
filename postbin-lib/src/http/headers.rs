use rama::http::HeaderName;

/// Requested delay for the root route.
pub const HEADER_NAME_X_DELAY: HeaderName = HeaderName::from_static("x-delay");

/// Requested status code for the root route.
pub const HEADER_NAME_X_STATUS: HeaderName = HeaderName::from_static("x-status");

/// Shared secret compared against the `/auth/{code}` path parameter.
pub const HEADER_NAME_X_WEBHOOK_TOKEN: HeaderName =
    HeaderName::from_static("x-messagesystems-webhook-token");

/// Batch identifier attached by webhook senders, logged for correlation only.
pub const HEADER_NAME_X_BATCH_ID: HeaderName =
    HeaderName::from_static("x-messagesystems-batch-id");
