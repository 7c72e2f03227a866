//! HTTP transport port implementation.

use std::sync::Arc;

use dtg_core::{TransportError, TransportPort, TransportSession};

use crate::config::HttpTransportConfig;
use crate::session::HttpSession;

/// Range-capable HTTP transport.
///
/// One `reqwest` client (and its connection pool) is shared by every session
/// this transport opens.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpTransport {
    /// Create a transport with the given configuration.
    pub fn new(config: &HttpTransportConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::other(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            token: config.token.clone(),
        })
    }

    /// Create a transport with default configuration.
    pub fn default_transport() -> Result<Self, TransportError> {
        Self::new(&HttpTransportConfig::default())
    }
}

impl TransportPort for HttpTransport {
    fn open_session(
        &self,
        session_identifier: &str,
    ) -> Result<Arc<dyn TransportSession>, TransportError> {
        tracing::debug!(target: "dtg.http", session = %session_identifier, "Opening HTTP session");
        Ok(Arc::new(HttpSession::new(
            session_identifier,
            self.client.clone(),
            self.token.clone(),
        )))
    }
}
