mod context;
pub use context::{BodyRejection, RequestBody, RequestContext};

mod content_type;
pub use content_type::KnownContentType;

pub mod headers;
pub mod response;
