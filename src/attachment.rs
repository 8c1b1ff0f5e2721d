//! Email attachments with support for inline and regular attachments.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MailError;

/// Type of attachment disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttachmentType {
    /// Regular attachment (shown as downloadable file)
    #[default]
    Attachment,
    /// Inline attachment (embedded in HTML via cid:)
    Inline,
}

/// An email attachment.
///
/// Attachments can be created from bytes or text (eager) or from a file path
/// (lazy). Path-based attachments defer reading until delivery time.
///
/// Mandrill receives regular attachments in `message.attachments` and inline
/// ones in `message.images`, both base64-encoded.
///
/// ```
/// use mandrill_transport::Attachment;
///
/// let report = Attachment::from_bytes("report.pdf", b"PDF content".to_vec());
/// assert_eq!(report.content_type, "application/pdf");
///
/// let notes = Attachment::from_text("notes.csv", "a,b\n1,2").content_type("text/csv");
/// assert_eq!(notes.base64_data().unwrap(), "YSxiCjEsMg==");
/// ```
///
/// Deserialization also accepts the `{filename, content, contentType}` shape
/// of a mail descriptor. `content` may be a string (stored as UTF-8) or a
/// byte array, and a missing content type is guessed from the filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AttachmentDescriptor")]
pub struct Attachment {
    /// Filename for the attachment
    pub filename: String,
    /// MIME content type (e.g., "application/pdf", "image/png")
    pub content_type: String,
    /// Raw attachment data (empty if using path-based lazy loading)
    #[serde(default)]
    pub data: Vec<u8>,
    /// File path for lazy loading.
    #[serde(default)]
    pub path: Option<String>,
    /// Whether this is an inline or regular attachment
    #[serde(default)]
    pub disposition: AttachmentType,
    /// Content-ID for inline attachments (used as cid: reference)
    #[serde(default)]
    pub content_id: Option<String>,
}

impl Attachment {
    /// Create a new attachment from raw bytes.
    ///
    /// Content type is guessed from the filename extension.
    pub fn from_bytes(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = guess_content_type(&filename);

        Self {
            filename,
            content_type,
            data,
            path: None,
            disposition: AttachmentType::Attachment,
            content_id: None,
        }
    }

    /// Create a new attachment from text. The text is stored as UTF-8.
    pub fn from_text(filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self::from_bytes(filename, text.into().into_bytes())
    }

    /// Create a new attachment from a file path, reading it immediately.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MailError> {
        let path = path.as_ref();
        let data = read_file(&path.display().to_string())?;

        Ok(Self {
            data,
            ..Self::from_bytes(file_name(path), Vec::new())
        })
    }

    /// Create a new attachment from a file path (lazy loading).
    ///
    /// The file must exist now; it is read when the attachment is encoded
    /// for delivery.
    pub fn from_path_lazy(path: impl AsRef<Path>) -> Result<Self, MailError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MailError::AttachmentFileNotFound(path.display().to_string()));
        }

        Ok(Self {
            path: Some(path.to_string_lossy().to_string()),
            ..Self::from_bytes(file_name(path), Vec::new())
        })
    }

    /// Set the content type explicitly.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Set as inline attachment (for embedding in HTML).
    ///
    /// The content id defaults to the filename.
    pub fn inline(mut self) -> Self {
        self.disposition = AttachmentType::Inline;
        if self.content_id.is_none() {
            self.content_id = Some(self.filename.clone());
        }
        self
    }

    /// Set the Content-ID for inline attachments.
    pub fn content_id(mut self, cid: impl Into<String>) -> Self {
        self.content_id = Some(cid.into());
        self
    }

    /// Get the attachment data, loading from path if necessary.
    ///
    /// # Errors
    ///
    /// - `AttachmentFileNotFound` - File path doesn't exist
    /// - `AttachmentReadError` - Failed to read file
    /// - `AttachmentMissingContent` - No data and no path provided
    pub fn get_data(&self) -> Result<Vec<u8>, MailError> {
        match &self.path {
            Some(path) => read_file(path),
            None if self.data.is_empty() => {
                Err(MailError::AttachmentMissingContent(self.filename.clone()))
            }
            None => Ok(self.data.clone()),
        }
    }

    /// Get the attachment data as a base64-encoded string.
    ///
    /// An attachment created with empty data encodes to an empty string;
    /// only path-based attachments can fail here.
    pub fn base64_data(&self) -> Result<String, MailError> {
        let data = match self.get_data() {
            Err(MailError::AttachmentMissingContent(_)) => Vec::new(),
            other => other?,
        };
        Ok(BASE64.encode(&data))
    }

    /// Check if this is an inline attachment.
    pub fn is_inline(&self) -> bool {
        self.disposition == AttachmentType::Inline
    }
}

/// Attachment content as it arrives in a descriptor.
#[derive(Deserialize)]
#[serde(untagged)]
enum DescriptorContent {
    Text(String),
    Bytes(Vec<u8>),
}

#[derive(Deserialize)]
struct AttachmentDescriptor {
    filename: String,
    #[serde(default, alias = "contentType")]
    content_type: Option<String>,
    #[serde(default)]
    data: Vec<u8>,
    #[serde(default)]
    content: Option<DescriptorContent>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    disposition: AttachmentType,
    #[serde(default, alias = "contentId", alias = "cid")]
    content_id: Option<String>,
}

impl From<AttachmentDescriptor> for Attachment {
    fn from(descriptor: AttachmentDescriptor) -> Self {
        let data = match descriptor.content {
            Some(DescriptorContent::Text(text)) => text.into_bytes(),
            Some(DescriptorContent::Bytes(bytes)) => bytes,
            None => descriptor.data,
        };
        let content_type = descriptor
            .content_type
            .unwrap_or_else(|| guess_content_type(&descriptor.filename));

        Self {
            filename: descriptor.filename,
            content_type,
            data,
            path: descriptor.path,
            disposition: descriptor.disposition,
            content_id: descriptor.content_id,
        }
    }
}

fn guess_content_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .to_string()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("attachment")
        .to_string()
}

fn read_file(path: &str) -> Result<Vec<u8>, MailError> {
    std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MailError::AttachmentFileNotFound(path.to_string())
        } else {
            MailError::AttachmentReadError(format!("{}: {}", path, e))
        }
    })
}
