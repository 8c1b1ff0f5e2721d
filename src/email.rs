//! Email struct with builder pattern.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use crate::address::{normalize_all, Address, AddressInput, RecipientType};
use crate::attachment::Attachment;

/// A mail descriptor handed to the transport.
///
/// Use the builder pattern to construct emails:
///
/// ```
/// use mandrill_transport::Email;
///
/// let email = Email::new()
///     .from("Gary the Snail <gary@bikini.bottom>")
///     .to("SpongeBob <spongebob@bikini.bottom>, patrick@bikini.bottom")
///     .subject("Meow...")
///     .text_body("Meow!")
///     .html_body("<p>Meow!</p>");
/// ```
///
/// Or deserialize one from JSON; any key that is not a known field lands in
/// `provider_options`:
///
/// ```
/// use mandrill_transport::Email;
///
/// let email: Email = serde_json::from_str(r#"{
///     "to": "A <a@x.com>, B <b@x.com>",
///     "from": {"name": "D", "address": "d@x.com"},
///     "subject": "S",
///     "text": "T",
///     "tags": ["welcome"]
/// }"#).unwrap();
/// assert_eq!(email.to.len(), 1);
/// assert!(email.provider_options.contains_key("tags"));
/// ```
///
/// ## Provider options
///
/// Mandrill options may be given at the top level
/// (`provider_option("track_opens", true)`) or nested under `message`
/// (`message_option("track_opens", false)`); the nested value wins. The
/// special `mandrill_options` key holds a JSON object deep-merged over the
/// final request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Email {
    /// Sender address
    pub from: Option<AddressInput>,
    /// Primary recipients
    #[serde(deserialize_with = "one_or_many")]
    pub to: Vec<AddressInput>,
    /// Carbon copy recipients
    #[serde(deserialize_with = "one_or_many")]
    pub cc: Vec<AddressInput>,
    /// Blind carbon copy recipients
    #[serde(deserialize_with = "one_or_many")]
    pub bcc: Vec<AddressInput>,
    /// Reply-to addresses, sent as a `Reply-To` header
    #[serde(deserialize_with = "one_or_many")]
    pub reply_to: Vec<AddressInput>,
    /// Email subject line
    pub subject: Option<String>,
    /// Plain text body
    #[serde(alias = "text")]
    pub text_body: Option<String>,
    /// HTML body
    #[serde(alias = "html")]
    pub html_body: Option<String>,
    /// File attachments
    pub attachments: Vec<Attachment>,
    /// Custom email headers
    pub headers: HashMap<String, String>,
    /// Provider-specific options (e.g., tracking, tags, templates)
    #[serde(flatten)]
    pub provider_options: HashMap<String, serde_json::Value>,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<AddressInput>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<AddressInput>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(AddressInput::List(items)) => items,
        Some(single) => vec![single],
    })
}

impl Email {
    /// Create a new empty email.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sender.
    ///
    /// Accepts anything convertible to an [`AddressInput`]: `"email"`,
    /// `"Name <email>"`, `("Name", "email")` or an [`Address`].
    pub fn from(mut self, addr: impl Into<AddressInput>) -> Self {
        self.from = Some(addr.into());
        self
    }

    /// Add recipients. A string may hold several comma-separated entries.
    pub fn to(mut self, addr: impl Into<AddressInput>) -> Self {
        self.to.push(addr.into());
        self
    }

    /// Replace all recipients.
    pub fn put_to(mut self, addrs: impl Into<AddressInput>) -> Self {
        self.to = vec![addrs.into()];
        self
    }

    /// Add CC recipients.
    pub fn cc(mut self, addr: impl Into<AddressInput>) -> Self {
        self.cc.push(addr.into());
        self
    }

    /// Replace all CC recipients.
    pub fn put_cc(mut self, addrs: impl Into<AddressInput>) -> Self {
        self.cc = vec![addrs.into()];
        self
    }

    /// Add BCC recipients.
    pub fn bcc(mut self, addr: impl Into<AddressInput>) -> Self {
        self.bcc.push(addr.into());
        self
    }

    /// Replace all BCC recipients.
    pub fn put_bcc(mut self, addrs: impl Into<AddressInput>) -> Self {
        self.bcc = vec![addrs.into()];
        self
    }

    /// Add a reply-to address.
    pub fn reply_to(mut self, addr: impl Into<AddressInput>) -> Self {
        self.reply_to.push(addr.into());
        self
    }

    /// Set the subject line.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the plain text body.
    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.text_body = Some(body.into());
        self
    }

    /// Set the HTML body.
    pub fn html_body(mut self, body: impl Into<String>) -> Self {
        self.html_body = Some(body.into());
        self
    }

    /// Add an attachment.
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Add a custom header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set a top-level provider option.
    ///
    /// ```rust
    /// use mandrill_transport::Email;
    ///
    /// let email = Email::new()
    ///     .provider_option("template_name", "welcome-email")
    ///     .provider_option("tags", vec!["signup", "welcome"]);
    /// assert!(email.provider_options.contains_key("template_name"));
    /// ```
    pub fn provider_option(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.provider_options.insert(key.into(), value.into());
        self
    }

    /// Set an option nested under `message`, which outranks the top-level
    /// option of the same name.
    pub fn message_option(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        let message = self
            .provider_options
            .entry("message".to_string())
            .or_insert_with(|| serde_json::Value::Object(Default::default()));
        if !message.is_object() {
            *message = serde_json::Value::Object(Default::default());
        }
        if let Some(map) = message.as_object_mut() {
            map.insert(key.into(), value.into());
        }
        self
    }

    /// Set raw overrides deep-merged over the final Mandrill request body.
    pub fn mandrill_options(mut self, overrides: serde_json::Value) -> Self {
        self.provider_options
            .insert("mandrill_options".to_string(), overrides);
        self
    }

    /// All recipients, normalized: to, then cc, then bcc.
    pub fn all_recipients(&self) -> Vec<Address> {
        let mut all = normalize_all(&self.to, RecipientType::To);
        all.extend(normalize_all(&self.cc, RecipientType::Cc));
        all.extend(normalize_all(&self.bcc, RecipientType::Bcc));
        all
    }
}
