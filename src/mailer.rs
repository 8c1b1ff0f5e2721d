//! Mailer trait.
//!
//! `#[async_trait]` keeps the trait object-safe so the global mailer can be
//! held as an `Arc<dyn Mailer>` and swapped at runtime (a recording mailer in
//! tests, Mandrill in production). Callers who hold a concrete
//! [`MandrillTransport`](crate::MandrillTransport) can call `send` directly
//! and skip the boxing.

use async_trait::async_trait;

use crate::email::Email;
use crate::error::MailError;
use crate::outcome::SendOutcome;

/// Trait for email delivery backends.
///
/// # Example
///
/// ```ignore
/// use mandrill_transport::{Email, Mailer, MandrillTransport};
///
/// let mailer = MandrillTransport::new("md-xxxxxxxx");
///
/// let email = Email::new()
///     .from("sender@example.com")
///     .to("recipient@example.com")
///     .subject("Hello")
///     .text_body("World");
///
/// let outcome = mailer.deliver(&email).await?;
/// println!("Sent with ID: {:?}", outcome.message_id);
/// ```
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send a single email.
    async fn deliver(&self, email: &Email) -> Result<SendOutcome, MailError>;

    /// Send multiple emails, one call each, stopping at the first error.
    async fn deliver_many(&self, emails: &[Email]) -> Result<Vec<SendOutcome>, MailError> {
        let mut outcomes = Vec::with_capacity(emails.len());
        for email in emails {
            outcomes.push(self.deliver(email).await?);
        }
        Ok(outcomes)
    }

    /// Get the provider name (for logging/debugging).
    fn provider_name(&self) -> &'static str {
        "unknown"
    }

    /// Validate configuration.
    ///
    /// Called at startup to verify required configuration is present.
    fn validate_config(&self) -> Result<(), MailError> {
        Ok(())
    }
}
