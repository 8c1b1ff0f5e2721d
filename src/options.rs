//! Layered resolution of Mandrill message options.
//!
//! Every option is looked up in three places, first defined wins:
//!
//! 1. the call's nested `message` object (`Email::message_option`)
//! 2. the call's top-level provider options (`Email::provider_option`)
//! 3. the adapter-level [`MessageOptions`] given at construction
//!
//! and otherwise takes its documented default: `false` for flags, empty for
//! lists and maps, absent for strings. "Defined" means present and not JSON
//! `null`, so an explicit `false` always beats a lower-precedence `true`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Option names the resolver understands. Anything else in the call's
/// `message` object is passed through to the request untouched.
pub const RECOGNIZED_OPTIONS: &[&str] = &[
    "important",
    "track_opens",
    "track_clicks",
    "auto_text",
    "auto_html",
    "inline_css",
    "url_strip_qs",
    "preserve_recipients",
    "view_content_link",
    "merge",
    "async",
    "tags",
    "metadata",
    "recipient_metadata",
    "global_merge_vars",
    "merge_vars",
    "google_analytics_domains",
    "google_analytics_campaign",
    "bcc_address",
    "tracking_domain",
    "signing_domain",
    "return_path_domain",
    "subaccount",
    "merge_language",
    "ip_pool",
    "send_at",
    "template_name",
    "template_content",
];

/// Adapter-level defaults. Unset fields fall through to the documented
/// default.
///
/// Deserializable, so defaults can live in application config:
///
/// ```
/// use mandrill_transport::MessageOptions;
///
/// let defaults: MessageOptions = serde_json::from_str(
///     r#"{"track_opens": true, "tags": ["transactional"], "async": true}"#,
/// ).unwrap();
/// assert_eq!(defaults.track_opens, Some(true));
/// assert_eq!(defaults.async_send, Some(true));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageOptions {
    pub important: Option<bool>,
    pub track_opens: Option<bool>,
    pub track_clicks: Option<bool>,
    pub auto_text: Option<bool>,
    pub auto_html: Option<bool>,
    pub inline_css: Option<bool>,
    pub url_strip_qs: Option<bool>,
    pub preserve_recipients: Option<bool>,
    pub view_content_link: Option<bool>,
    pub merge: Option<bool>,
    #[serde(rename = "async")]
    pub async_send: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Map<String, Value>>,
    pub recipient_metadata: Option<Vec<Value>>,
    pub global_merge_vars: Option<Vec<Value>>,
    pub merge_vars: Option<Vec<Value>>,
    pub google_analytics_domains: Option<Vec<String>>,
    pub google_analytics_campaign: Option<String>,
    pub bcc_address: Option<String>,
    pub tracking_domain: Option<String>,
    pub signing_domain: Option<String>,
    pub return_path_domain: Option<String>,
    pub subaccount: Option<String>,
    pub merge_language: Option<String>,
    pub ip_pool: Option<String>,
    pub send_at: Option<String>,
    pub template_name: Option<String>,
    pub template_content: Option<Vec<Value>>,
}

/// Options that live inside Mandrill's `message` object, fully resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedMessage {
    pub important: bool,
    pub track_opens: bool,
    pub track_clicks: bool,
    pub auto_text: bool,
    pub auto_html: bool,
    pub inline_css: bool,
    pub url_strip_qs: bool,
    pub preserve_recipients: bool,
    pub view_content_link: bool,
    pub merge: bool,
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
    pub recipient_metadata: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub global_merge_vars: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub merge_vars: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub google_analytics_domains: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_analytics_campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bcc_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_path_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subaccount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_language: Option<String>,
    /// Unrecognized keys from the call's `message` object.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The full resolved parameter set for one send.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedConfig {
    pub async_send: bool,
    pub ip_pool: Option<String>,
    pub send_at: Option<String>,
    pub template_name: Option<String>,
    pub template_content: Option<Vec<Value>>,
    pub message: ResolvedMessage,
}

/// Resolve options for one call.
///
/// `call` is the mail's provider options map; its `message` entry, if an
/// object, is the nested tier.
///
/// Unrecognized keys inside `message` pass through to the request's
/// `message`. Unrecognized top-level keys are dropped; set arbitrary
/// top-level request fields with [`Email::mandrill_options`](crate::Email::mandrill_options).
///
/// ```
/// use mandrill_transport::{resolve, Email, MessageOptions};
///
/// let defaults = MessageOptions { track_opens: Some(false), ..Default::default() };
/// let email = Email::new()
///     .provider_option("track_opens", true)
///     .message_option("track_opens", false);
///
/// let resolved = resolve(&defaults, &email.provider_options);
/// assert!(!resolved.message.track_opens);
/// ```
pub fn resolve(defaults: &MessageOptions, call: &HashMap<String, Value>) -> ResolvedConfig {
    let nested = call.get("message").and_then(Value::as_object);
    let tiers = Tiers { nested, top: call };

    let mut extra = nested.cloned().unwrap_or_default();
    extra.retain(|key, _| !RECOGNIZED_OPTIONS.contains(&key.as_str()));

    let message = ResolvedMessage {
        important: tiers.flag("important", defaults.important),
        track_opens: tiers.flag("track_opens", defaults.track_opens),
        track_clicks: tiers.flag("track_clicks", defaults.track_clicks),
        auto_text: tiers.flag("auto_text", defaults.auto_text),
        auto_html: tiers.flag("auto_html", defaults.auto_html),
        inline_css: tiers.flag("inline_css", defaults.inline_css),
        url_strip_qs: tiers.flag("url_strip_qs", defaults.url_strip_qs),
        preserve_recipients: tiers.flag("preserve_recipients", defaults.preserve_recipients),
        view_content_link: tiers.flag("view_content_link", defaults.view_content_link),
        merge: tiers.flag("merge", defaults.merge),
        tags: tiers
            .pick("tags", defaults.tags.clone())
            .unwrap_or_default(),
        metadata: tiers
            .pick("metadata", defaults.metadata.clone())
            .unwrap_or_default(),
        recipient_metadata: tiers
            .pick("recipient_metadata", defaults.recipient_metadata.clone())
            .unwrap_or_default(),
        global_merge_vars: tiers
            .pick("global_merge_vars", defaults.global_merge_vars.clone())
            .unwrap_or_default(),
        merge_vars: tiers
            .pick("merge_vars", defaults.merge_vars.clone())
            .unwrap_or_default(),
        google_analytics_domains: tiers
            .pick(
                "google_analytics_domains",
                defaults.google_analytics_domains.clone(),
            )
            .unwrap_or_default(),
        google_analytics_campaign: tiers.pick(
            "google_analytics_campaign",
            defaults.google_analytics_campaign.clone(),
        ),
        bcc_address: tiers.pick("bcc_address", defaults.bcc_address.clone()),
        tracking_domain: tiers.pick("tracking_domain", defaults.tracking_domain.clone()),
        signing_domain: tiers.pick("signing_domain", defaults.signing_domain.clone()),
        return_path_domain: tiers.pick("return_path_domain", defaults.return_path_domain.clone()),
        subaccount: tiers.pick("subaccount", defaults.subaccount.clone()),
        merge_language: tiers.pick("merge_language", defaults.merge_language.clone()),
        extra,
    };

    ResolvedConfig {
        async_send: tiers.flag("async", defaults.async_send),
        ip_pool: tiers.pick("ip_pool", defaults.ip_pool.clone()),
        send_at: tiers.pick("send_at", defaults.send_at.clone()),
        template_name: tiers.pick("template_name", defaults.template_name.clone()),
        template_content: tiers.pick("template_content", defaults.template_content.clone()),
        message,
    }
}

struct Tiers<'a> {
    nested: Option<&'a Map<String, Value>>,
    top: &'a HashMap<String, Value>,
}

impl Tiers<'_> {
    fn pick<T: DeserializeOwned>(&self, key: &str, fallback: Option<T>) -> Option<T> {
        self.nested
            .and_then(|m| defined(key, "message", m.get(key)))
            .or_else(|| defined(key, "top-level", self.top.get(key)))
            .or(fallback)
    }

    fn flag(&self, key: &str, fallback: Option<bool>) -> bool {
        self.pick(key, fallback).unwrap_or(false)
    }
}

/// A present, non-null value of the right type. A value of the wrong type
/// is logged and treated as absent so the next tier gets a chance.
fn defined<T: DeserializeOwned>(key: &str, tier: &'static str, value: Option<&Value>) -> Option<T> {
    match value {
        None | Some(Value::Null) => None,
        Some(value) => match T::deserialize(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(
                    option = key,
                    tier,
                    value = %value,
                    error = %e,
                    "Ignoring Mandrill option with unexpected type"
                );
                None
            }
        },
    }
}
