//! Shared API helpers reused across handlers.

mod response;
mod upstream_error;

pub(crate) use response::{ok_json_response, sse_ok_response};
pub(crate) use upstream_error::{sanitize_upstream_error, upstream_error_from_response};
