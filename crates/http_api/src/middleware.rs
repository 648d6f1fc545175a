use axum::{
    body::Body,
    http::{Request, StatusCode, header::ORIGIN},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::errors::HttpError;

/// Browsers attach `Origin` to cross-site requests; anything not served from
/// this machine is refused.
pub async fn require_loopback_origin(req: Request<Body>, next: Next) -> Result<Response, HttpError> {
    if let Some(origin) = req.headers().get(ORIGIN) {
        let origin = origin.to_str().map_err(|_| {
            HttpError::new(
                StatusCode::BAD_REQUEST,
                "invalid Origin header",
                Some("invalid_origin".to_string()),
            )
        })?;
        if !is_loopback_origin(origin) {
            warn!(origin, path = req.uri().path(), "rejected non-loopback origin");
            return Err(HttpError::new(
                StatusCode::FORBIDDEN,
                "invalid origin",
                Some("invalid_origin".to_string()),
            ));
        }
    }

    Ok(next.run(req).await)
}

fn is_loopback_origin(origin: &str) -> bool {
    let Some((scheme, rest)) = origin.split_once("://") else {
        return false;
    };
    if scheme != "http" && scheme != "https" {
        return false;
    }
    let host = if let Some(bracketed) = rest.strip_prefix('[') {
        match bracketed.split_once(']') {
            Some((host, tail)) if tail.is_empty() || tail.starts_with(':') => host,
            _ => return false,
        }
    } else {
        match rest.split_once(':') {
            Some((host, _port)) => host,
            None => rest,
        }
    };
    matches!(host, "127.0.0.1" | "localhost" | "::1")
}

#[cfg(test)]
mod tests {
    use super::is_loopback_origin;

    #[test]
    fn accepts_loopback_hosts_only() {
        for origin in [
            "http://127.0.0.1:3847",
            "http://localhost:5173",
            "https://localhost",
            "http://[::1]:3847",
        ] {
            assert!(is_loopback_origin(origin), "{origin}");
        }
        for origin in [
            "http://evil.example",
            "http://localhost.evil.example:3847",
            "http://127.0.0.1.nip.io",
            "file://localhost",
            "null",
            "http://[::1]evil",
        ] {
            assert!(!is_loopback_origin(origin), "{origin}");
        }
    }
}
