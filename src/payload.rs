//! Assembly of the Mandrill request body.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::ops::Index;

use crate::address::{normalize, normalize_all, Address, RecipientType};
use crate::attachment::Attachment;
use crate::email::Email;
use crate::error::MailError;
use crate::options::{ResolvedConfig, ResolvedMessage};

/// Provider option keys holding raw request overrides.
const OVERRIDE_KEYS: &[&str] = &["mandrill_options", "mandrillOptions"];

static NULL: Value = Value::Null;

/// A Mandrill send request body, ready for `messages/send` or
/// `messages/send-template`.
///
/// Indexing with a missing key yields `Value::Null`, like
/// [`serde_json::Value`]:
///
/// ```
/// use mandrill_transport::SendPayload;
/// use serde_json::json;
///
/// let payload: SendPayload = serde_json::from_value(json!({
///     "async": false,
///     "message": {"to": [{"email": "a@x.com"}]}
/// })).unwrap();
/// assert_eq!(payload["message"]["to"][0]["email"], "a@x.com");
/// assert!(payload["template_name"].is_null());
/// assert!(!payload.is_template());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SendPayload(Map<String, Value>);

impl SendPayload {
    /// The template name, if this is a template send.
    pub fn template_name(&self) -> Option<&str> {
        self.0.get("template_name").and_then(Value::as_str)
    }

    /// Whether the payload selects the template-send endpoint.
    ///
    /// A `template_name` explicitly set to `null` counts as absent.
    pub fn is_template(&self) -> bool {
        self.0
            .get("template_name")
            .is_some_and(|name| !name.is_null())
    }

    /// Number of entries in `message.to`.
    pub fn recipient_count(&self) -> usize {
        self["message"]["to"].as_array().map_or(0, Vec::len)
    }

    /// Borrow the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Take the underlying JSON object.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl Index<&str> for SendPayload {
    type Output = Value;

    fn index(&self, key: &str) -> &Value {
        self.0.get(key).unwrap_or(&NULL)
    }
}

/// Normalized sender and the combined to/cc/bcc list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recipients {
    /// First sender record, if any.
    pub from: Option<Address>,
    /// To, then cc, then bcc.
    pub to: Vec<Address>,
}

impl Recipients {
    /// Normalize the addresses of a mail.
    pub fn from_email(email: &Email) -> Self {
        Self {
            from: normalize(email.from.as_ref(), RecipientType::To)
                .into_iter()
                .next(),
            to: email.all_recipients(),
        }
    }
}

/// Message content copied into the request.
#[derive(Debug, Clone, Default)]
pub struct Content<'a> {
    pub subject: Option<&'a str>,
    pub text: Option<&'a str>,
    pub html: Option<&'a str>,
    pub headers: HashMap<String, String>,
    /// Attachments in send order, regular and inline mixed.
    pub attachments: Vec<&'a Attachment>,
}

impl<'a> Content<'a> {
    /// Collect content from a mail.
    ///
    /// `defaults` come first, followed by the mail's own attachments. A
    /// `Reply-To` header is derived from `reply_to` unless the mail already
    /// sets one.
    pub fn from_email(email: &'a Email, defaults: &'a [Attachment]) -> Self {
        let mut headers = email.headers.clone();
        let reply_to = normalize_all(&email.reply_to, RecipientType::To);
        let has_reply_to = headers.keys().any(|k| k.eq_ignore_ascii_case("reply-to"));
        if !reply_to.is_empty() && !has_reply_to {
            let joined = reply_to
                .iter()
                .map(Address::formatted)
                .collect::<Vec<_>>()
                .join(", ");
            headers.insert("Reply-To".to_string(), joined);
        }

        Self {
            subject: email.subject.as_deref(),
            text: email.text_body.as_deref(),
            html: email.html_body.as_deref(),
            headers,
            attachments: defaults.iter().chain(email.attachments.iter()).collect(),
        }
    }
}

/// Raw request overrides carried by a mail, if any.
pub fn overrides(email: &Email) -> Option<&Value> {
    OVERRIDE_KEYS
        .iter()
        .find_map(|key| email.provider_options.get(*key))
}

/// Build the request body.
///
/// Overrides are deep-merged last and win on conflict, so they may also
/// introduce or remove `template_name`. Once a template is selected,
/// `template_content` defaults to an empty list.
///
/// # Errors
///
/// Fails only if a path-based attachment cannot be read.
pub fn build(
    resolved: ResolvedConfig,
    recipients: Recipients,
    content: Content<'_>,
    overrides: Option<&Value>,
) -> Result<SendPayload, MailError> {
    let (attachments, images) = encode_attachments(&content.attachments)?;
    let from = recipients.from.unwrap_or_default();

    let request = MandrillRequest {
        async_send: resolved.async_send,
        ip_pool: resolved.ip_pool,
        send_at: resolved.send_at,
        template_name: resolved.template_name,
        template_content: resolved.template_content,
        message: MandrillMessage {
            to: recipients.to,
            from_name: from.name,
            from_email: if from.email.is_empty() {
                None
            } else {
                Some(from.email)
            },
            subject: content.subject,
            headers: content.headers,
            text: content.text,
            html: content.html,
            attachments,
            images,
            options: resolved.message,
        },
    };

    let mut body = serde_json::to_value(&request)?;
    if let Some(overrides) = overrides {
        if overrides.is_object() {
            deep_merge(&mut body, overrides);
        } else {
            tracing::warn!(%overrides, "Ignoring Mandrill overrides that are not an object");
        }
    }

    let Value::Object(mut map) = body else {
        return Err(MailError::JsonError("request body is not an object".into()));
    };

    let selects_template = map.get("template_name").is_some_and(|v| !v.is_null());
    let has_content = map.get("template_content").is_some_and(|v| !v.is_null());
    if selects_template && !has_content {
        map.insert("template_content".to_string(), Value::Array(Vec::new()));
    }

    Ok(SendPayload(map))
}

/// Recursively merge `overrides` into `base`. Objects merge key by key; any
/// other value replaces what was there.
pub fn deep_merge(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (&mut Value::Object(ref mut base), &Value::Object(ref overrides)) => {
            for (key, value) in overrides {
                deep_merge(base.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (base, value) => *base = value.clone(),
    }
}

fn encode_attachments(
    attachments: &[&Attachment],
) -> Result<(Vec<MandrillAttachment>, Vec<MandrillAttachment>), MailError> {
    let mut regular = Vec::new();
    let mut inline = Vec::new();

    for attachment in attachments {
        if attachment.is_inline() {
            inline.push(MandrillAttachment {
                content_type: attachment.content_type.clone(),
                name: attachment
                    .content_id
                    .clone()
                    .unwrap_or_else(|| attachment.filename.clone()),
                content: attachment.base64_data()?,
            });
        } else {
            regular.push(MandrillAttachment {
                content_type: attachment.content_type.clone(),
                name: attachment.filename.clone(),
                content: attachment.base64_data()?,
            });
        }
    }

    Ok((regular, inline))
}

// ============================================================================
// Mandrill API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct MandrillRequest<'a> {
    #[serde(rename = "async")]
    async_send: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    ip_pool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    send_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    template_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    template_content: Option<Vec<Value>>,
    message: MandrillMessage<'a>,
}

#[derive(Debug, Serialize)]
struct MandrillMessage<'a> {
    to: Vec<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<MandrillAttachment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<MandrillAttachment>,
    #[serde(flatten)]
    options: ResolvedMessage,
}

#[derive(Debug, Serialize)]
struct MandrillAttachment {
    #[serde(rename = "type")]
    content_type: String,
    name: String,
    content: String, // Base64 encoded
}
