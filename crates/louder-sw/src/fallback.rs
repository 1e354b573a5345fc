//! Responses synthesized when neither cache nor network can answer.

use http::StatusCode;
use louder_net::Response;

/// Placeholder served for images that cannot be fetched.
pub const OFFLINE_IMAGE_SVG: &str = concat!(
    r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="200">"##,
    r##"<rect width="200" height="200" fill="#000"/>"##,
    r##"<text x="50%" y="50%" text-anchor="middle" fill="#fff" dy=".3em">Offline</text>"##,
    r##"</svg>"##
);

/// Body of the 503 served when network-first finds nothing to fall back on.
pub const NO_CACHE_AVAILABLE: &str = "Network error and no cache available";

/// 200 with the inline "Offline" SVG.
pub fn offline_image() -> Response {
    Response::new(StatusCode::OK, OFFLINE_IMAGE_SVG).with_content_type("image/svg+xml")
}

/// 503 with a plain-text reason.
pub fn unavailable(reason: &'static str) -> Response {
    Response::new(StatusCode::SERVICE_UNAVAILABLE, reason)
        .with_content_type("text/plain; charset=utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_image() {
        let response = offline_image();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type().unwrap().essence_str(), "image/svg+xml");
        assert!(response.text().contains(">Offline</text>"));
    }

    #[test]
    fn test_unavailable() {
        let response = unavailable(NO_CACHE_AVAILABLE);
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.status_text(), "Service Unavailable");
        assert_eq!(response.text(), NO_CACHE_AVAILABLE);
    }
}
