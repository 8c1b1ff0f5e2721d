//! The Mandrill transport: turns an [`Email`] into a Mandrill API call and
//! the response into a [`SendOutcome`].
//!
//! # Example
//!
//! ```rust,ignore
//! use mandrill_transport::{Email, MandrillTransport};
//!
//! let transport = MandrillTransport::new("md-xxxxxxxx")
//!     .async_send(true)
//!     .tags(["transactional"]);
//!
//! let email = Email::new()
//!     .from("Gary the Snail <gary@bikini.bottom>")
//!     .to("SpongeBob <spongebob@bikini.bottom>")
//!     .subject("Meow...")
//!     .text_body("Meow!");
//!
//! let outcome = transport.send(&email).await?;
//! for rejected in &outcome.rejected {
//!     println!("{:?}: {:?}", rejected.email, rejected.reject_reason);
//! }
//! ```
//!
//! ## Templates
//!
//! Set `template_name` at construction, per call, or through overrides to
//! route the request to `messages/send-template`:
//!
//! ```rust,ignore
//! let email = Email::new()
//!     .to("patrick@bikini.bottom")
//!     .provider_option("template_name", "welcome")
//!     .provider_option("template_content", json!([{"name": "main", "content": "Hi"}]));
//! ```

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::attachment::Attachment;
use crate::client::{MandrillApi, MandrillClient};
use crate::email::Email;
use crate::error::MailError;
use crate::mailer::Mailer;
use crate::options::{resolve, MessageOptions};
use crate::outcome::{classify, SendOutcome};
use crate::payload::{self, Content, Recipients};

/// Mail transport backed by the Mandrill API.
///
/// Adapter-level defaults are fixed at construction and shared read-only by
/// every `send`; per-call options on the [`Email`] take precedence.
pub struct MandrillTransport<A = MandrillClient> {
    api: A,
    defaults: MessageOptions,
    default_attachments: Vec<Attachment>,
}

impl MandrillTransport<MandrillClient> {
    /// Create a transport talking to Mandrill with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_api(MandrillClient::new(api_key))
    }

    /// Create with a custom reqwest client.
    pub fn with_client(api_key: impl Into<String>, client: reqwest::Client) -> Self {
        Self::with_api(MandrillClient::with_client(api_key, client))
    }

    /// Set a custom base URL (for testing).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.api = self.api.base_url(url);
        self
    }
}

impl<A: MandrillApi> MandrillTransport<A> {
    /// Create a transport over any [`MandrillApi`] implementation.
    pub fn with_api(api: A) -> Self {
        Self {
            api,
            defaults: MessageOptions::default(),
            default_attachments: Vec::new(),
        }
    }

    /// Replace all adapter-level message defaults.
    pub fn defaults(mut self, defaults: MessageOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Default for Mandrill's `async` flag.
    pub fn async_send(mut self, enabled: bool) -> Self {
        self.defaults.async_send = Some(enabled);
        self
    }

    /// Default for `preserve_recipients`. Unset, it resolves to `false`.
    pub fn preserve_recipients(mut self, enabled: bool) -> Self {
        self.defaults.preserve_recipients = Some(enabled);
        self
    }

    /// Default for `important`.
    pub fn important(mut self, enabled: bool) -> Self {
        self.defaults.important = Some(enabled);
        self
    }

    /// Default for `track_opens`.
    pub fn track_opens(mut self, enabled: bool) -> Self {
        self.defaults.track_opens = Some(enabled);
        self
    }

    /// Default for `track_clicks`.
    pub fn track_clicks(mut self, enabled: bool) -> Self {
        self.defaults.track_clicks = Some(enabled);
        self
    }

    /// Default tags.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.defaults.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Default metadata.
    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.defaults.metadata = Some(metadata);
        self
    }

    /// Default per-recipient metadata.
    pub fn recipient_metadata(mut self, entries: Vec<Value>) -> Self {
        self.defaults.recipient_metadata = Some(entries);
        self
    }

    /// Send through this server-side template unless a call says otherwise.
    pub fn default_template(mut self, name: impl Into<String>) -> Self {
        self.defaults.template_name = Some(name.into());
        self
    }

    /// Default editable regions for template sends.
    pub fn template_content(mut self, content: Vec<Value>) -> Self {
        self.defaults.template_content = Some(content);
        self
    }

    /// Attach this file to every message, ahead of the call's own
    /// attachments.
    pub fn default_attachment(mut self, attachment: Attachment) -> Self {
        self.default_attachments.push(attachment);
        self
    }

    /// The adapter-level defaults.
    pub fn message_options(&self) -> &MessageOptions {
        &self.defaults
    }

    /// The underlying API client.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Send one mail.
    ///
    /// Rejected recipients are not an error; they are reported in
    /// [`SendOutcome::rejected`]. Provider and network failures are returned
    /// as they come from the client.
    pub async fn send(&self, email: &Email) -> Result<SendOutcome, MailError> {
        let resolved = resolve(&self.defaults, &email.provider_options);
        let payload = payload::build(
            resolved,
            Recipients::from_email(email),
            Content::from_email(email, &self.default_attachments),
            payload::overrides(email),
        )?;

        let response = if payload.is_template() {
            tracing::debug!(
                template = payload.template_name().unwrap_or_default(),
                recipients = payload.recipient_count(),
                "Sending via messages/send-template"
            );
            self.api.send_template(&payload).await
        } else {
            tracing::debug!(
                recipients = payload.recipient_count(),
                "Sending via messages/send"
            );
            self.api.send(&payload).await
        };

        let results = match response {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(error = %e, "Mandrill call failed");
                return Err(e);
            }
        };

        let outcome = classify(results);
        for rejected in &outcome.rejected {
            tracing::warn!(
                email = rejected.email.as_deref().unwrap_or_default(),
                status = rejected.status.as_deref().unwrap_or_default(),
                reject_reason = rejected.reject_reason.as_deref().unwrap_or_default(),
                "Recipient rejected"
            );
        }
        tracing::info!(
            message_id = outcome.message_id.as_deref().unwrap_or_default(),
            accepted = outcome.accepted.len(),
            rejected = outcome.rejected.len(),
            "Mandrill send complete"
        );

        #[cfg(feature = "metrics")]
        {
            metrics::counter!("mandrill_recipients_total", "status" => "accepted")
                .increment(outcome.accepted.len() as u64);
            metrics::counter!("mandrill_recipients_total", "status" => "rejected")
                .increment(outcome.rejected.len() as u64);
        }

        Ok(outcome)
    }
}

#[async_trait]
impl<A: MandrillApi> Mailer for MandrillTransport<A> {
    async fn deliver(&self, email: &Email) -> Result<SendOutcome, MailError> {
        self.send(email).await
    }

    fn provider_name(&self) -> &'static str {
        "mandrill"
    }

    fn validate_config(&self) -> Result<(), MailError> {
        self.api.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_set_defaults() {
        let transport = MandrillTransport::new("md-key")
            .async_send(true)
            .preserve_recipients(true)
            .track_opens(false)
            .tags(["a", "b"])
            .default_template("welcome");

        let defaults = transport.message_options();
        assert_eq!(defaults.async_send, Some(true));
        assert_eq!(defaults.preserve_recipients, Some(true));
        assert_eq!(defaults.track_opens, Some(false));
        assert_eq!(defaults.tags, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(defaults.template_name.as_deref(), Some("welcome"));
        assert_eq!(defaults.track_clicks, None);
    }

    #[test]
    fn test_validate_config() {
        assert!(MandrillTransport::new("md-key").validate_config().is_ok());
        assert!(MandrillTransport::new("").validate_config().is_err());
        assert_eq!(MandrillTransport::new("md-key").provider_name(), "mandrill");
    }
}
