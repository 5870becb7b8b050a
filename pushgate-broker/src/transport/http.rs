//! Managed push gateway callback API.
//!
//! `POST {endpoint}/@connections/{connection_id}` with the raw frame as body.
//! The gateway answers 410 once the connection is closed for good.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use pushgate_core::config::TransportConfig;
use pushgate_core::models::ConnectionId;

use super::{PushError, PushTransport};
use crate::{Error, Result};

#[derive(Clone)]
pub struct HttpGatewayTransport {
    client: Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpGatewayTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn connection_url(&self, connection_id: &ConnectionId) -> String {
        format!(
            "{}/@connections/{}",
            self.endpoint,
            utf8_percent_encode(connection_id.as_str(), NON_ALPHANUMERIC)
        )
    }
}

#[async_trait]
impl PushTransport for HttpGatewayTransport {
    async fn post(&self, connection_id: &ConnectionId, data: &[u8]) -> std::result::Result<(), PushError> {
        let mut request = self
            .client
            .post(self.connection_url(connection_id))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(data.to_vec());
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::GONE => {
                debug!(connection_id = %connection_id, "Gateway reports connection gone");
                Err(PushError::Gone)
            }
            status => Err(PushError::Transport(format!(
                "gateway returned {status} for connection {connection_id}"
            ))),
        }
    }
}

impl std::fmt::Debug for HttpGatewayTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGatewayTransport")
            .field("endpoint", &self.endpoint)
            .field("auth", &self.auth_token.is_some())
            .finish_non_exhaustive()
    }
}
