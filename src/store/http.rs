//! HTTP command proxy executor
//!
//! [`HttpExecutor`] sends every command as a single `POST` to the proxy
//! endpoint with the body `{"command": ["VERB", "arg", ...]}`. A `2xx`
//! response body is the JSON-encoded reply. Any other status is a failure;
//! when the body is `{"error": "..."}` the message is carried into the
//! returned [`ChatKvError::Transport`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChatKvError, Result};
use crate::store::{Command, CommandExecutor, Reply};

#[derive(Debug, Serialize)]
struct CommandRequest {
    command: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Executor that forwards commands to the HTTP command proxy.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use url::Url;
/// use chatkv::store::http::HttpExecutor;
///
/// let executor = HttpExecutor::new(
///     Url::parse("http://localhost:8001/").unwrap(),
///     Duration::from_secs(10),
/// )
/// .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    http_client: reqwest::Client,
    endpoint: url::Url,
}

impl HttpExecutor {
    /// Build an executor targeting `endpoint` with a per-request `timeout`.
    ///
    /// No network I/O happens here.
    ///
    /// # Errors
    ///
    /// Returns [`ChatKvError::Transport`] if the HTTP client cannot be built
    /// (TLS backend initialisation failure).
    pub fn new(endpoint: url::Url, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatKvError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl CommandExecutor for HttpExecutor {
    async fn execute(&self, command: Command) -> Result<Reply> {
        let request = CommandRequest {
            command: command.to_args(),
        };

        let response = self
            .http_client
            .post(self.endpoint.as_str())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(ChatKvError::Transport(format!(
                    "{} request failed: {}",
                    command.name(),
                    e
                )))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            anyhow::anyhow!(ChatKvError::Transport(format!(
                "failed to read {} response: {}",
                command.name(),
                e
            )))
        })?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            return Err(anyhow::anyhow!(ChatKvError::Transport(format!(
                "{} returned HTTP {}: {}",
                command.name(),
                status,
                detail
            ))));
        }

        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            anyhow::anyhow!(ChatKvError::MalformedResponse(format!(
                "{} reply is not JSON: {}",
                command.name(),
                e
            )))
        })?;

        Ok(Reply::from_json(value))
    }
}
