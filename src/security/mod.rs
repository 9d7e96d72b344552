//! Security utilities

pub mod headers;
pub mod timing;

pub use headers::api_security_headers;
pub use timing::{constant_time_eq, AuthTimer};
