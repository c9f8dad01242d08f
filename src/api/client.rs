//! XBE Client
//!
//! Executes compiled requests against one base URL, attaching the bearer
//! token and classifying failures.

use serde_json::Value;

use super::auth::Credential;
use super::http::{HttpRequest, Transport};
use crate::error::{classify_status, CliError};
use crate::resource::CompiledRequest;

/// Client bound to a base URL and an optional credential
pub struct ApiClient<'a> {
    base_url: String,
    credential: Option<Credential>,
    transport: &'a dyn Transport,
}

impl<'a> ApiClient<'a> {
    pub fn new(
        base_url: impl Into<String>,
        credential: Option<Credential>,
        transport: &'a dyn Transport,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
            transport,
        }
    }

    /// Absolute URL for a compiled request
    pub fn url_for(&self, request: &CompiledRequest) -> String {
        format!("{}{}", self.base_url, request.path_and_query())
    }

    /// Send a request; returns the decoded document, or `None` for an empty 2xx body
    pub async fn execute(&self, request: &CompiledRequest) -> Result<Option<Value>, CliError> {
        let body = request
            .body
            .as_ref()
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| CliError::Transport(format!("failed to encode request body: {e}")))?;

        let http_request = HttpRequest {
            method: request.method,
            url: self.url_for(request),
            bearer: self.credential.as_ref().map(|c| c.token().to_string()),
            body,
        };

        let response = self.transport.send(http_request).await?;

        if !response.is_success() {
            return Err(classify_status(response.status, &response.body));
        }

        if response.body.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&response.body)
            .map(Some)
            .map_err(|e| CliError::Transport(format!("failed to parse response JSON: {e}")))
    }
}
