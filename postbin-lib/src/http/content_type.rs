use rama::http::mime::{self, Mime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Request body content types which are parsed into structured data.
pub enum KnownContentType {
    Json,
    Form,
}

impl KnownContentType {
    /// Exact header value demanded by the strict token endpoint.
    pub const FORM_URLENCODED: &'static str = "application/x-www-form-urlencoded";

    pub fn detect_from_header_value(value: &str) -> Option<Self> {
        let content_type: Mime = value.parse().ok()?;

        if content_type.type_() == mime::APPLICATION
            && (content_type.subtype() == mime::JSON || content_type.suffix() == Some(mime::JSON))
        {
            Some(Self::Json)
        } else if content_type.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str()
        {
            Some(Self::Form)
        } else {
            None
        }
    }
}
