// src/utils.rs
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use std::net::IpAddr;
use log::debug;
use std::fmt;

#[derive(Debug)]
pub enum RequestError {
    MissingPeerIP,
    InvalidForwardedHeader(String),
    RateLimitExceeded,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPeerIP => write!(f, "Failed to extract client IP"),
            Self::InvalidForwardedHeader(value) => {
                write!(f, "Invalid X-Forwarded-For header: {}", value)
            }
            Self::RateLimitExceeded => write!(f, "Rate limit exceeded"),
        }
    }
}

impl ResponseError for RequestError {
    fn error_response(&self) -> HttpResponse {
        match self {
            Self::RateLimitExceeded => HttpResponse::TooManyRequests().body(self.to_string()),
            _ => HttpResponse::BadRequest().body(self.to_string()),
        }
    }
}

/// Client address for rate limiting.
///
/// The peer address is the key unless the peer is one of `trusted_proxies`,
/// in which case the first `X-Forwarded-For` hop is used instead.
pub fn extract_client_ip(req: &HttpRequest, trusted_proxies: &[IpAddr]) -> Result<IpAddr, RequestError> {
    let peer = req.peer_addr().map(|addr| addr.ip()).ok_or(RequestError::MissingPeerIP)?;

    if !trusted_proxies.contains(&peer) {
        return Ok(peer);
    }

    match req.headers().get("X-Forwarded-For") {
        Some(forwarded_for) => {
            let raw = forwarded_for
                .to_str()
                .map_err(|_| RequestError::InvalidForwardedHeader("<non-ascii>".to_string()))?;
            let first = raw.split(',').next().unwrap_or("").trim();
            first
                .parse::<IpAddr>()
                .map_err(|_| RequestError::InvalidForwardedHeader(raw.to_string()))
        }
        None => {
            debug!("Trusted proxy {} sent no X-Forwarded-For, using peer address", peer);
            Ok(peer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn proxies() -> Vec<IpAddr> {
        vec!["10.0.0.1".parse().unwrap()]
    }

    #[test]
    fn test_forwarded_header_from_trusted_proxy() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "203.0.113.7, 10.0.0.1"))
            .peer_addr("10.0.0.1:5000".parse().unwrap())
            .to_http_request();
        assert_eq!(
            extract_client_ip(&req, &proxies()).unwrap(),
            "203.0.113.7".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_forwarded_header_ignored_from_untrusted_peer() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "203.0.113.7"))
            .peer_addr("127.0.0.1:5000".parse().unwrap())
            .to_http_request();
        assert_eq!(
            extract_client_ip(&req, &proxies()).unwrap(),
            "127.0.0.1".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            extract_client_ip(&req, &[]).unwrap(),
            "127.0.0.1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_trusted_proxy_without_header_uses_peer() {
        let req = TestRequest::default()
            .peer_addr("10.0.0.1:5000".parse().unwrap())
            .to_http_request();
        assert_eq!(
            extract_client_ip(&req, &proxies()).unwrap(),
            "10.0.0.1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_garbage_forwarded_header() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "not-an-ip"))
            .peer_addr("10.0.0.1:5000".parse().unwrap())
            .to_http_request();
        assert!(matches!(
            extract_client_ip(&req, &proxies()),
            Err(RequestError::InvalidForwardedHeader(_))
        ));
    }

    #[test]
    fn test_missing_peer() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "203.0.113.7"))
            .to_http_request();
        assert!(matches!(
            extract_client_ip(&req, &proxies()),
            Err(RequestError::MissingPeerIP)
        ));
    }
}
