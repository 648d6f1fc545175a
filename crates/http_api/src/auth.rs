use axum::http::{HeaderMap, header::AUTHORIZATION};
use rand::RngCore;
use subtle::ConstantTimeEq;
use telemetry_app::AppError;

const BEARER_PREFIX: &str = "Bearer ";

pub fn generate_auth_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}

/// Accepts only `Authorization: Bearer <token>`. A token passed in the query
/// string is refused even when it is correct.
pub fn verify_bearer(headers: &HeaderMap, query: Option<&str>, expected: &str) -> Result<(), AppError> {
    if query.is_some_and(query_carries_token) {
        return Err(AppError::Unauthorized(
            "tokens are not accepted in the query string".to_string(),
        ));
    }
    let supplied = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;
    if tokens_match(supplied, expected) {
        Ok(())
    } else {
        Err(AppError::Unauthorized("invalid bearer token".to_string()))
    }
}

fn tokens_match(supplied: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(supplied.as_bytes().ct_eq(expected.as_bytes()))
}

fn query_carries_token(query: &str) -> bool {
    query.split('&').any(|pair| {
        let key = pair.split_once('=').map_or(pair, |(key, _)| key);
        key.eq_ignore_ascii_case("token") || key.eq_ignore_ascii_case("access_token")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).expect("header"));
        headers
    }

    #[test]
    fn generated_tokens_are_long_and_distinct() {
        let first = generate_auth_token();
        let second = generate_auth_token();
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[test]
    fn bearer_header_must_match() {
        assert!(verify_bearer(&headers("Bearer secret"), None, "secret").is_ok());
        assert!(verify_bearer(&headers("Bearer secreT"), None, "secret").is_err());
        assert!(verify_bearer(&headers("Bearer secret-longer"), None, "secret").is_err());
        assert!(verify_bearer(&headers("Bearer  secret"), None, "secret").is_err());
        assert!(verify_bearer(&headers("Bearer secret "), None, "secret").is_err());
        assert!(verify_bearer(&headers("Basic secret"), None, "secret").is_err());
        assert!(verify_bearer(&HeaderMap::new(), None, "secret").is_err());
        assert!(verify_bearer(&headers("Bearer "), None, "").is_err());
    }

    #[test]
    fn query_tokens_are_rejected() {
        let result = verify_bearer(&headers("Bearer secret"), Some("token=secret"), "secret");
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
        assert!(verify_bearer(&headers("Bearer secret"), Some("verbose=1"), "secret").is_ok());
    }
}
