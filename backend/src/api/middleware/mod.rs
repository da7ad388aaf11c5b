//! API middleware.

pub mod actor;
pub mod security_headers;
