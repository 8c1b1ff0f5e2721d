//! Email addresses, recipient lists and their normalization.
//!
//! Callers describe recipients in whatever shape is convenient: a single
//! `"Name <email>"` string, a comma-joined list of them, a pre-built
//! [`Address`], or an arbitrarily nested list mixing all of these. Everything
//! funnels through [`normalize`], which flattens the input into an ordered
//! list of [`Address`] records tagged with their [`RecipientType`].

use email_address::EmailAddress;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MailError;

/// Recipient kind within the flattened Mandrill `to` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientType {
    /// Primary recipient.
    #[default]
    To,
    /// Carbon copy.
    Cc,
    /// Blind carbon copy.
    Bcc,
}

impl RecipientType {
    /// The tag written on the wire. Primary recipients carry no tag.
    fn wire_tag(self) -> Option<RecipientType> {
        match self {
            RecipientType::To => None,
            other => Some(other),
        }
    }
}

impl fmt::Display for RecipientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecipientType::To => "to",
            RecipientType::Cc => "cc",
            RecipientType::Bcc => "bcc",
        };
        f.write_str(s)
    }
}

/// An email address with an optional display name and recipient type.
///
/// This is the uniform record every address input is normalized into. The
/// `kind` is serialized as `type` and omitted for primary recipients.
///
/// # Examples
///
/// ```
/// use mandrill_transport::Address;
///
/// let addr: Address = "user@example.com".into();
/// assert_eq!(addr.email, "user@example.com");
/// assert_eq!(addr.name, None);
///
/// let addr: Address = ("Alice", "alice@example.com").into();
/// assert_eq!(addr.name, Some("Alice".to_string()));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Optional display name (e.g., "Alice Smith")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Email address (e.g., "alice@example.com")
    #[serde(alias = "address")]
    pub email: String,
    /// Recipient type; `None` means primary recipient.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<RecipientType>,
}

impl Address {
    /// Create a new address with just an email.
    ///
    /// This performs a basic sanity check (non-empty, contains @) and logs
    /// a warning if the email looks invalid. For strict validation, use
    /// [`Address::parse`] instead.
    pub fn new(email: impl Into<String>) -> Self {
        let email = email.into();

        if !Self::basic_sanity_check(&email) {
            tracing::warn!(
                email = %email,
                "Creating address with potentially invalid email"
            );
        }

        Self {
            name: None,
            email,
            kind: None,
        }
    }

    /// Create a new address with a name and email.
    ///
    /// An empty name is stored as `None`.
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            name: if name.is_empty() { None } else { Some(name) },
            ..Self::new(email)
        }
    }

    fn basic_sanity_check(email: &str) -> bool {
        !email.is_empty() && email.contains('@')
    }

    /// Set the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Tag this address as cc or bcc. Tagging as `To` clears the tag.
    pub fn kind(mut self, kind: RecipientType) -> Self {
        self.kind = kind.wire_tag();
        self
    }

    /// The recipient type, treating an untagged address as primary.
    pub fn recipient_type(&self) -> RecipientType {
        self.kind.unwrap_or_default()
    }

    /// Parse and validate an email address.
    ///
    /// Uses RFC 5321/5322 compliant validation. Returns an error if the
    /// email address is invalid.
    ///
    /// ```
    /// use mandrill_transport::Address;
    ///
    /// assert!(Address::parse("user@example.com").is_ok());
    /// assert!(Address::parse("not-an-email").is_err());
    /// ```
    pub fn parse(email: &str) -> Result<Self, MailError> {
        if !EmailAddress::is_valid(email) {
            return Err(MailError::InvalidAddress(format!(
                "'{}' is not a valid email address",
                email
            )));
        }

        Ok(Self {
            name: None,
            email: email.to_string(),
            kind: None,
        })
    }

    /// Format as "Name <email>" or just "email" if no name.
    pub fn formatted(&self) -> String {
        match &self.name {
            Some(name) if name.is_empty() => self.email.clone(),
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }

    /// Canonical form of a pre-built record under the given positional type.
    ///
    /// The record's own type wins over the positional one. Returns `None` for
    /// records without an email.
    fn canonical(&self, positional: RecipientType) -> Option<Self> {
        let email = self.email.trim();
        if email.is_empty() {
            tracing::debug!(name = ?self.name, "Skipping address record without email");
            return None;
        }
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        Some(Self {
            name,
            email: email.to_string(),
            kind: self.kind.unwrap_or(positional).wire_tag(),
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

impl From<&str> for Address {
    fn from(email: &str) -> Self {
        Self::new(email)
    }
}

impl From<String> for Address {
    fn from(email: String) -> Self {
        Self::new(email)
    }
}

impl<N: Into<String>, E: Into<String>> From<(N, E)> for Address {
    fn from((name, email): (N, E)) -> Self {
        Self::with_name(name, email)
    }
}

/// Any of the shapes a caller may use to describe addresses.
///
/// Deserializes untagged, so JSON strings, arrays and objects all work:
///
/// ```
/// use mandrill_transport::AddressInput;
///
/// let input: AddressInput = serde_json::from_str(
///     r#"["Alice <alice@example.com>", {"name": "Bob", "address": "bob@example.com"}]"#,
/// ).unwrap();
/// assert!(matches!(input, AddressInput::List(ref items) if items.len() == 2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AddressInput {
    /// One or more comma-separated `Name <email>` entries.
    Text(String),
    /// Any nesting of other inputs.
    List(Vec<AddressInput>),
    /// A pre-built record.
    Record(Address),
}

impl From<&str> for AddressInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AddressInput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&String> for AddressInput {
    fn from(s: &String) -> Self {
        Self::Text(s.clone())
    }
}

impl From<Address> for AddressInput {
    fn from(addr: Address) -> Self {
        Self::Record(addr)
    }
}

impl<N: Into<String>, E: Into<String>> From<(N, E)> for AddressInput {
    fn from(pair: (N, E)) -> Self {
        Self::Record(pair.into())
    }
}

impl<T: Into<AddressInput>> From<Vec<T>> for AddressInput {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// Normalize an address input into flat, typed records.
///
/// Absent input yields an empty list. Strings are parsed leniently with
/// [`parse_address_list`]; lists are flattened recursively; a pre-built
/// record keeps its own type if it has one. Primary recipients come out
/// untagged.
///
/// ```
/// use mandrill_transport::{normalize, AddressInput, RecipientType};
///
/// let input = AddressInput::from("Alice <alice@example.com>, bob@example.com");
/// let records = normalize(Some(&input), RecipientType::Cc);
/// assert_eq!(records.len(), 2);
/// assert_eq!(records[0].name.as_deref(), Some("Alice"));
/// assert_eq!(records[1].kind, Some(RecipientType::Cc));
/// ```
pub fn normalize(input: Option<&AddressInput>, kind: RecipientType) -> Vec<Address> {
    let mut out = Vec::new();
    if let Some(input) = input {
        collect(input, kind, &mut out);
    }
    out
}

/// Normalize a sequence of inputs, in order, as if they were one list.
pub fn normalize_all(inputs: &[AddressInput], kind: RecipientType) -> Vec<Address> {
    let mut out = Vec::new();
    for input in inputs {
        collect(input, kind, &mut out);
    }
    out
}

fn collect(input: &AddressInput, kind: RecipientType, out: &mut Vec<Address>) {
    match input {
        AddressInput::Text(text) => {
            out.extend(parse_address_list(text).into_iter().map(|a| a.kind(kind)));
        }
        AddressInput::List(items) => {
            for item in items {
                collect(item, kind, out);
            }
        }
        AddressInput::Record(addr) => out.extend(addr.canonical(kind)),
    }
}

/// Parse a comma-separated list of RFC 5322 style mailboxes.
///
/// Accepts `Name <email>`, `"Quoted, Name" <email>` and bare `email`
/// entries, as well as `group: a@x, b@x;` syntax (the group name is
/// dropped). Parsing never fails: an entry that is not recognizably an
/// address becomes a record whose `email` is the raw trimmed entry.
///
/// ```
/// use mandrill_transport::parse_address_list;
///
/// let addrs = parse_address_list(r#""Doe, Jane" <jane@example.com>, bob@example.com"#);
/// assert_eq!(addrs.len(), 2);
/// assert_eq!(addrs[0].name.as_deref(), Some("Doe, Jane"));
/// assert_eq!(addrs[1].email, "bob@example.com");
/// ```
pub fn parse_address_list(input: &str) -> Vec<Address> {
    split_entries(input)
        .iter()
        .filter_map(|entry| parse_entry(entry))
        .collect()
}

/// Split on top-level `,` and `;`, ignoring separators inside quotes or
/// angle brackets. A top-level `:` starts a group only when an address
/// follows it or the entry is closed by `;`; otherwise the colon is kept
/// as part of the entry.
fn split_entries(input: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut group: Option<usize> = None;
    let mut in_quotes = false;
    let mut escaped = false;
    let mut in_angle = false;

    for c in input.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '<' if !in_quotes => {
                in_angle = true;
                current.push(c);
            }
            '>' if !in_quotes => {
                in_angle = false;
                current.push(c);
            }
            ',' | ';' if !in_quotes && !in_angle => {
                entries.push(strip_group(std::mem::take(&mut current), group.take(), c == ';'));
            }
            ':' if !in_quotes && !in_angle && group.is_none() && !current.contains('@') => {
                group = Some(current.len());
                current.push(c);
            }
            _ => current.push(c),
        }
    }
    entries.push(strip_group(current, group, false));
    entries
}

/// Drop a `name:` group prefix from an entry. `colon` is the byte offset of
/// the colon.
fn strip_group(entry: String, colon: Option<usize>, closed: bool) -> String {
    match colon {
        Some(colon) => {
            let rest = &entry[colon + 1..];
            if closed || rest.contains('@') || rest.contains('<') {
                rest.to_string()
            } else {
                entry
            }
        }
        None => entry,
    }
}

fn parse_entry(entry: &str) -> Option<Address> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }

    let Some(open) = find_unquoted(entry, '<') else {
        return Some(Address::new(entry));
    };

    let rest = &entry[open + 1..];
    let email = match rest.find('>') {
        Some(close) => rest[..close].trim(),
        None => rest.trim(),
    };
    if email.is_empty() {
        return Some(Address::new(entry));
    }

    Some(Address::with_name(unquote(&entry[..open]), email))
}

fn find_unquoted(s: &str, needle: char) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == needle && !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

/// Drop unescaped double quotes, resolve backslash escapes, collapse
/// whitespace.
fn unquote(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {}
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            _ => out.push(c),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
