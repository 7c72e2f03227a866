//! Public configuration for the HTTP transport.

use std::time::Duration;

/// Configuration for the HTTP transport.
///
/// # Example
///
/// ```
/// use dtg_http::HttpTransportConfig;
/// use std::time::Duration;
///
/// let config = HttpTransportConfig::new()
///     .with_connect_timeout(Duration::from_secs(5))
///     .with_user_agent("my-player/1.0");
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// User agent string for HTTP requests
    pub(crate) user_agent: String,
    /// Timeout for establishing a connection
    pub(crate) connect_timeout: Duration,
    /// Timeout for a whole request, body included; `None` for no limit
    pub(crate) request_timeout: Option<Duration>,
    /// Optional bearer token sent with every request
    pub(crate) token: Option<String>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("dtg-http/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: None,
            token: None,
        }
    }
}

impl HttpTransportConfig {
    /// Create a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the user agent string for HTTP requests.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the connect timeout.
    ///
    /// Defaults to 30 seconds.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Limit the total duration of one request.
    ///
    /// Unset by default, since segment sizes vary widely.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set a bearer token for protected content.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set an optional bearer token.
    #[must_use]
    pub fn with_optional_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}
