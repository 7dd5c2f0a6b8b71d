//! App-only access tokens.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Clock skew subtracted from the advertised lifetime.
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// A cached bearer token.
#[derive(Debug, Clone)]
pub struct Token {
    /// Access token string.
    pub access_token: String,
    /// Expiration time, when advertised by the server.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Build a token from the endpoint response.
    #[must_use]
    pub fn from_response(response: TokenResponse) -> Self {
        let expires_at = response
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(i64::from(secs)));
        Self {
            access_token: response.access_token,
            expires_at,
        }
    }

    /// Whether the token is expired, with a 60 second skew buffer.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|exp| Utc::now() + Duration::seconds(EXPIRY_SKEW_SECONDS) >= exp)
    }
}

/// Token response from the Microsoft identity platform.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u32>,
}

/// Error body from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorResponse {
    /// Error code.
    pub error: String,
    /// Human-readable description.
    #[serde(default)]
    pub error_description: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn token_without_expiry_never_expires() {
        let token = Token {
            access_token: "abc".into(),
            expires_at: None,
        };
        assert!(!token.is_expired());
    }

    #[test]
    fn token_expiring_within_skew_counts_as_expired() {
        let token = Token {
            access_token: "abc".into(),
            expires_at: Some(Utc::now() + Duration::seconds(30)),
        };
        assert!(token.is_expired());
    }

    #[test]
    fn fresh_token_is_valid() {
        let token = Token::from_response(TokenResponse {
            access_token: "abc".into(),
            expires_in: Some(3600),
        });
        assert!(!token.is_expired());
    }
}
