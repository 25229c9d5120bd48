//! Opaque random strings: session tokens, guest tokens and nonces

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of every token and nonce this host issues
pub const TOKEN_LENGTH: usize = 50;

const AUTH_PREFIX: &str = "IMP auth=";

/// A fresh 50-character alphanumeric token
pub fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Session token from an `Authorization: IMP auth=<token>` header value
pub fn extract_session_token(header: Option<&str>) -> Option<&str> {
    let token = header?.trim().strip_prefix(AUTH_PREFIX)?.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_token_shape() {
        let a = random_token();
        let b = random_token();
        assert_eq!(a.len(), TOKEN_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_extract_session_token() {
        assert_eq!(extract_session_token(Some("IMP auth=abc123")), Some("abc123"));
        assert_eq!(extract_session_token(Some("Bearer abc123")), None);
        assert_eq!(extract_session_token(Some("IMP auth=")), None);
        assert_eq!(extract_session_token(None), None);
    }
}
