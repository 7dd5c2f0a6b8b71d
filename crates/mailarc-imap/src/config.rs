//! Connection configuration.

/// IMAP server connection settings.
#[derive(Debug, Clone, Default)]
pub struct ImapConfig {
    /// Server hostname.
    pub host: String,
    /// Server port (993 for implicit TLS).
    pub port: u16,
    /// Username for authentication.
    pub username: String,
    /// Password for authentication.
    pub password: String,
}

impl ImapConfig {
    /// Default port for implicit TLS connections.
    pub const DEFAULT_TLS_PORT: u16 = 993;

    /// Create a configuration with the default TLS port.
    #[must_use]
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: Self::DEFAULT_TLS_PORT,
            username: username.into(),
            password: password.into(),
        }
    }
}
