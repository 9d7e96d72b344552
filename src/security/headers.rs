//! Security headers for API responses
//!
//! Responses carry tokens and personal data, so they are never cached and
//! never framed.

use warp::http::header::{HeaderMap, HeaderValue, CACHE_CONTROL};

/// Content Security Policy for a JSON-only API
const API_CSP: &str = "default-src 'none'; frame-ancestors 'none';";

const PERMISSIONS_POLICY: &str =
    "geolocation=(), microphone=(), camera=(), payment=(), usb=()";

/// Headers added to every API response, for use with `warp::reply::with::headers`
pub fn api_security_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.insert("Content-Security-Policy", HeaderValue::from_static(API_CSP));
    headers.insert("Permissions-Policy", HeaderValue::from_static(PERMISSIONS_POLICY));
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_headers() {
        let headers = api_security_headers();

        assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
        assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
        assert_eq!(
            headers.get(CACHE_CONTROL).unwrap(),
            "no-cache, no-store, must-revalidate"
        );
        assert!(headers.get("Content-Security-Policy").is_some());
    }
}
