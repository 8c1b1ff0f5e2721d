//! # mandrill-transport
//!
//! Send mail through Mailchimp Transactional (Mandrill).
//!
//! ## Quick Start
//!
//! Set environment variables:
//! ```bash
//! EMAIL_PROVIDER=mandrill
//! MANDRILL_API_KEY=md-xxxxx
//! EMAIL_FROM=noreply@example.com
//! EMAIL_FROM_NAME=My App
//! ```
//!
//! Send emails from anywhere:
//! ```rust,ignore
//! use mandrill_transport::{Email, deliver};
//!
//! let email = Email::new()
//!     .to("SpongeBob <spongebob@bikini.bottom>, patrick@bikini.bottom")
//!     .cc("Squidward <squidward@bikini.bottom>")
//!     .subject("Welcome!")
//!     .text_body("Hello");
//!
//! let outcome = deliver(&email).await?;
//! println!("{} accepted, {} rejected", outcome.accepted.len(), outcome.rejected.len());
//! ```
//!
//! ## Explicit transport
//!
//! ```rust,ignore
//! use mandrill_transport::{Email, MandrillTransport};
//!
//! let transport = MandrillTransport::new("md-xxxxx")
//!     .async_send(true)
//!     .preserve_recipients(false)
//!     .tags(["transactional"]);
//!
//! let outcome = transport.send(&email).await?;
//! ```
//!
//! ## How a send works
//!
//! 1. Addresses (`to`, `cc`, `bcc`, `from`) are normalized from any accepted
//!    shape into flat [`Address`] records ([`normalize`]).
//! 2. Message options are resolved from the call's nested `message` object,
//!    the call's top-level options and the transport defaults ([`resolve`]).
//! 3. The request body is built and raw overrides are deep-merged over it
//!    ([`build`]).
//! 4. `messages/send-template` is called when a `template_name` is present,
//!    `messages/send` otherwise.
//! 5. Per-recipient results are split into accepted and rejected
//!    ([`classify`]).
//!
//! Rejected recipients are not errors. Only transport failures and unreadable
//! attachment files surface as [`MailError`].
//!
//! ## Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `EMAIL_PROVIDER` | `mandrill` (optional when `MANDRILL_API_KEY` is set) |
//! | `EMAIL_FROM` | Default sender email |
//! | `EMAIL_FROM_NAME` | Default sender name |
//! | `MANDRILL_API_KEY` | Mandrill API key |
//! | `MANDRILL_BASE_URL` | API base URL (default: `https://mandrillapp.com/api/1.0`) |
//! | `MANDRILL_ASYNC` | Default for the `async` flag (`true`/`false`) |
//! | `MANDRILL_PRESERVE_RECIPIENTS` | Default for `preserve_recipients` |
//! | `MANDRILL_TEMPLATE` | Default template name |
//!
//! ## Feature Flags
//!
//! - `metrics` - Prometheus-style metrics (counters/histograms)
//!
//! ## Metrics
//!
//! Enable `features = ["metrics"]` to emit:
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `mandrill_emails_total` | Counter | status | Send calls made |
//! | `mandrill_recipients_total` | Counter | status | Recipients accepted/rejected |
//! | `mandrill_delivery_duration_seconds` | Histogram | | Send call duration |
//!
//! Install a recorder (e.g., `metrics-exporter-prometheus`) in your app to collect them.

/// The version of the mandrill-transport crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod address;
mod attachment;
mod client;
mod email;
mod error;
mod mailer;
mod options;
mod outcome;
mod payload;
mod transport;

use parking_lot::RwLock;
use std::env;
use std::sync::Arc;
use tracing::Instrument;

#[cfg(feature = "metrics")]
use std::time::Instant;

// Re-exports
pub use address::{normalize, normalize_all, parse_address_list, Address, AddressInput, RecipientType};
pub use attachment::{Attachment, AttachmentType};
pub use client::{MandrillApi, MandrillClient};
pub use email::Email;
pub use error::MailError;
pub use mailer::Mailer;
pub use options::{resolve, MessageOptions, ResolvedConfig, ResolvedMessage, RECOGNIZED_OPTIONS};
pub use outcome::{classify, ProviderResult, SendOutcome, ACCEPTED_STATUSES};
pub use payload::{build, deep_merge, overrides, Content, Recipients, SendPayload};
pub use transport::MandrillTransport;

// ============================================================================
// Global Mailer Configuration
// ============================================================================

/// Global mailer - swappable for testing
static MAILER: RwLock<Option<Arc<dyn Mailer>>> = RwLock::new(None);

/// Get the default from address from environment.
pub fn default_from() -> Option<Address> {
    let email = env::var("EMAIL_FROM").ok()?;
    match env::var("EMAIL_FROM_NAME").ok() {
        Some(name) => Some(Address::with_name(name, email)),
        None => Some(Address::new(email)),
    }
}

fn env_flag(name: &str) -> Result<Option<bool>, MailError> {
    match env::var(name) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(MailError::Configuration(format!(
                "{} must be true or false, got {:?}",
                name, value
            ))),
        },
        Err(_) => Ok(None),
    }
}

/// Create mailer from environment variables.
fn create_mailer_from_env() -> Result<Arc<dyn Mailer>, MailError> {
    let provider = match env::var("EMAIL_PROVIDER") {
        Ok(p) => p.to_lowercase(),
        Err(_) if env::var("MANDRILL_API_KEY").is_ok() => {
            tracing::debug!(provider = "mandrill", "Auto-detected email provider");
            "mandrill".to_string()
        }
        Err(_) => {
            return Err(MailError::Configuration(
                "EMAIL_PROVIDER not set and MANDRILL_API_KEY not found".into(),
            ));
        }
    };

    if provider != "mandrill" {
        return Err(MailError::Configuration(format!(
            "Unknown EMAIL_PROVIDER: {}. The only valid provider is mandrill",
            provider
        )));
    }

    let key = env::var("MANDRILL_API_KEY")
        .map_err(|_| MailError::Configuration("MANDRILL_API_KEY not set".into()))?;

    let mut transport = MandrillTransport::new(key);
    if let Ok(base_url) = env::var("MANDRILL_BASE_URL") {
        transport = transport.base_url(base_url);
    }
    if let Some(enabled) = env_flag("MANDRILL_ASYNC")? {
        transport = transport.async_send(enabled);
    }
    if let Some(enabled) = env_flag("MANDRILL_PRESERVE_RECIPIENTS")? {
        transport = transport.preserve_recipients(enabled);
    }
    if let Ok(template) = env::var("MANDRILL_TEMPLATE") {
        transport = transport.default_template(template);
    }

    transport.validate_config()?;
    Ok(Arc::new(transport))
}

/// Get or initialize the global mailer.
fn get_mailer() -> Result<Arc<dyn Mailer>, MailError> {
    // Fast path: already configured
    if let Some(mailer) = MAILER.read().as_ref() {
        return Ok(Arc::clone(mailer));
    }

    let mailer = create_mailer_from_env()?;
    let mut guard = MAILER.write();

    // Another caller may have configured it meanwhile
    Ok(Arc::clone(guard.get_or_insert(mailer)))
}

/// Check if email is configured from the environment.
///
/// True when a mailer was configured manually, or when
/// `MANDRILL_API_KEY` is set and `EMAIL_PROVIDER` is unset or `mandrill`.
pub fn is_configured() -> bool {
    if MAILER.read().is_some() {
        return true;
    }
    let key_set = env::var("MANDRILL_API_KEY").is_ok_and(|k| !k.trim().is_empty());
    match env::var("EMAIL_PROVIDER") {
        Ok(p) if p.eq_ignore_ascii_case("mandrill") => key_set,
        Ok(p) => {
            tracing::warn!(provider = %p, "EMAIL_PROVIDER is not mandrill");
            false
        }
        Err(_) => key_set,
    }
}

/// Initialize the mailer from environment variables.
///
/// ```rust,ignore
/// // In main.rs
/// mandrill_transport::init().ok(); // Ignore error if email not configured
/// ```
pub fn init() -> Result<(), MailError> {
    if !is_configured() {
        return Err(MailError::NotConfigured);
    }
    let _ = get_mailer()?;
    Ok(())
}

/// Add the default from address if the email has none.
fn prepare_email(email: &Email) -> Email {
    let mut email = email.clone();
    if email.from.is_none() {
        email.from = default_from().map(AddressInput::from);
    }
    email
}

async fn deliver_instrumented(
    mailer: &dyn Mailer,
    email: &Email,
) -> Result<SendOutcome, MailError> {
    let provider = mailer.provider_name();
    let email = prepare_email(email);
    let recipients: Vec<String> = email.all_recipients().into_iter().map(|a| a.email).collect();

    let span = tracing::info_span!(
        "mandrill.deliver",
        provider = provider,
        to = ?recipients,
        subject = email.subject.as_deref().unwrap_or_default(),
    );

    async move {
        tracing::debug!("Delivering email");

        #[cfg(feature = "metrics")]
        let start = Instant::now();

        let result = mailer.deliver(&email).await;

        #[cfg(feature = "metrics")]
        {
            let duration = start.elapsed().as_secs_f64();
            let status = if result.is_ok() { "success" } else { "error" };
            metrics::counter!("mandrill_emails_total", "status" => status).increment(1);
            metrics::histogram!("mandrill_delivery_duration_seconds").record(duration);
        }

        match &result {
            Ok(outcome) => tracing::info!(
                message_id = outcome.message_id.as_deref().unwrap_or_default(),
                accepted = outcome.accepted.len(),
                rejected = outcome.rejected.len(),
                "Email delivered"
            ),
            Err(e) => tracing::error!(error = %e, "Email delivery failed"),
        }

        result
    }
    .instrument(span)
    .await
}

/// Deliver an email using the global mailer.
///
/// Auto-configures from environment variables on first call.
/// Adds the default `from` address from `EMAIL_FROM` if not set on email.
///
/// ```rust,ignore
/// use mandrill_transport::{Email, deliver};
///
/// let email = Email::new()
///     .to("user@example.com")
///     .subject("Hello!")
///     .text_body("Hi there");
///
/// deliver(&email).await?;
/// ```
pub async fn deliver(email: &Email) -> Result<SendOutcome, MailError> {
    let mailer = get_mailer()?;
    deliver_instrumented(mailer.as_ref(), email).await
}

/// Deliver an email using a specific mailer (per-call override).
///
/// ```rust,ignore
/// use mandrill_transport::{Email, MandrillTransport, deliver_with};
///
/// let mailer = MandrillTransport::new("different_api_key");
/// deliver_with(&email, &mailer).await?;
/// ```
pub async fn deliver_with<M: Mailer>(email: &Email, mailer: &M) -> Result<SendOutcome, MailError> {
    deliver_instrumented(mailer, email).await
}

/// Deliver multiple emails using the global mailer.
pub async fn deliver_many(emails: &[Email]) -> Result<Vec<SendOutcome>, MailError> {
    let mailer = get_mailer()?;
    let provider = mailer.provider_name();
    let count = emails.len();
    let emails: Vec<Email> = emails.iter().map(prepare_email).collect();

    let span = tracing::info_span!("mandrill.deliver_many", provider = provider, count = count);

    async move {
        #[cfg(feature = "metrics")]
        let start = Instant::now();

        let result = mailer.deliver_many(&emails).await;

        #[cfg(feature = "metrics")]
        {
            let duration = start.elapsed().as_secs_f64();
            let status = if result.is_ok() { "success" } else { "error" };
            metrics::counter!("mandrill_emails_total", "status" => status)
                .increment(count as u64);
            metrics::histogram!("mandrill_delivery_duration_seconds", "batch" => "true")
                .record(duration);
        }

        if let Err(e) = &result {
            tracing::error!(error = %e, "Batch delivery failed");
        }
        result
    }
    .instrument(span)
    .await
}

// ============================================================================
// Manual Configuration (for testing or custom setups)
// ============================================================================

/// Manually configure the global mailer.
///
/// Can be called multiple times - later calls replace the previous mailer.
///
/// ```rust,ignore
/// use mandrill_transport::{configure, MandrillTransport};
///
/// configure(MandrillTransport::new("md-xxxxx").async_send(true));
/// ```
pub fn configure<M: Mailer + 'static>(mailer: M) {
    *MAILER.write() = Some(Arc::new(mailer));
}

/// Configure with an Arc'd mailer.
pub fn configure_arc(mailer: Arc<dyn Mailer>) {
    *MAILER.write() = Some(mailer);
}

/// Reset the global mailer (useful for tests).
///
/// After calling this, the next `deliver()` will re-initialize from env vars.
pub fn reset() {
    *MAILER.write() = None;
}

/// Get a reference to the configured mailer (if initialized).
pub fn mailer() -> Option<Arc<dyn Mailer>> {
    MAILER.read().as_ref().cloned()
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{Address, AddressInput, Attachment, Email, MailError, Mailer};
    pub use crate::{MandrillTransport, SendOutcome};
    pub use crate::{default_from, deliver, deliver_many, deliver_with, is_configured};
}
