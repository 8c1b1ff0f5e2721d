//! Mandrill HTTP API client.
//!
//! # Example
//!
//! ```rust,ignore
//! use mandrill_transport::{MandrillApi, MandrillClient};
//!
//! let client = MandrillClient::new("md-xxxxxxxx");
//! let results = client.send(&payload).await?;
//! ```
//!
//! The API key travels in the request body as `key`, as Mandrill expects.
//! Responses are returned as raw JSON; classify them with
//! [`classify`](crate::classify).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::MailError;
use crate::payload::SendPayload;

const MANDRILL_API_URL: &str = "https://mandrillapp.com/api/1.0";

/// The two Mandrill calls the transport needs.
///
/// Implemented by [`MandrillClient`]; tests substitute a recording double.
#[async_trait]
pub trait MandrillApi: Send + Sync {
    /// `POST /messages/send.json`
    async fn send(&self, payload: &SendPayload) -> Result<Value, MailError>;

    /// `POST /messages/send-template.json`
    async fn send_template(&self, payload: &SendPayload) -> Result<Value, MailError>;

    /// Whether the client has credentials to call the API.
    fn validate_config(&self) -> Result<(), MailError> {
        Ok(())
    }
}

#[async_trait]
impl<T: MandrillApi + ?Sized> MandrillApi for Arc<T> {
    async fn send(&self, payload: &SendPayload) -> Result<Value, MailError> {
        (**self).send(payload).await
    }

    async fn send_template(&self, payload: &SendPayload) -> Result<Value, MailError> {
        (**self).send_template(payload).await
    }

    fn validate_config(&self) -> Result<(), MailError> {
        (**self).validate_config()
    }
}

/// Mandrill API client over reqwest.
pub struct MandrillClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl MandrillClient {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            base_url: MANDRILL_API_URL.to_string(),
        }
    }

    /// Create with a custom reqwest client.
    pub fn with_client(api_key: impl Into<String>, client: Client) -> Self {
        Self {
            api_key: api_key.into(),
            client,
            base_url: MANDRILL_API_URL.to_string(),
        }
    }

    /// Set a custom base URL (for testing).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call(&self, endpoint: &str, payload: &SendPayload) -> Result<Value, MailError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let mut body = payload.as_map().clone();
        body.insert("key".to_string(), Value::String(self.api_key.clone()));

        tracing::debug!(%url, "Calling Mandrill");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header("User-Agent", format!("mandrill-transport/{}", crate::VERSION))
            .json(&body)
            .send()
            .await?;
        let status = response.status();

        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let error: MandrillError = response.json().await.unwrap_or(MandrillError {
                name: None,
                message: "Unknown error".to_string(),
            });
            Err(Self::parse_error(status, error))
        }
    }

    fn parse_error(status: reqwest::StatusCode, error: MandrillError) -> MailError {
        let message = match error.name {
            Some(name) => format!("[{}] {}", name, error.message),
            None => error.message,
        };
        MailError::provider_with_status("mandrill", message, status.as_u16())
    }
}

#[async_trait]
impl MandrillApi for MandrillClient {
    async fn send(&self, payload: &SendPayload) -> Result<Value, MailError> {
        self.call("messages/send.json", payload).await
    }

    async fn send_template(&self, payload: &SendPayload) -> Result<Value, MailError> {
        self.call("messages/send-template.json", payload).await
    }

    fn validate_config(&self) -> Result<(), MailError> {
        if self.api_key.trim().is_empty() {
            return Err(MailError::Configuration("Mandrill API key is empty".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Mandrill API Types
// ============================================================================

/// `{"status": "error", "code": -1, "name": "Invalid_Key", "message": "..."}`
#[derive(Debug, Deserialize)]
struct MandrillError {
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "unknown_error")]
    message: String,
}

fn unknown_error() -> String {
    "Unknown error".to_string()
}
