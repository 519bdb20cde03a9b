// Core types for report artifacts

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of a test or step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    Broken,
    Skipped,
}

/// Content type of an attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    /// Plain text
    Text,
    /// PNG image
    Png,
    /// JPEG image
    Jpeg,
    /// Newline-separated list of URIs, rendered as links
    UriList,
}

impl AttachmentKind {
    pub fn mime(&self) -> &'static str {
        match self {
            AttachmentKind::Text => "text/plain",
            AttachmentKind::Png => "image/png",
            AttachmentKind::Jpeg => "image/jpeg",
            AttachmentKind::UriList => "text/uri-list",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AttachmentKind::Text => "txt",
            AttachmentKind::Png => "png",
            AttachmentKind::Jpeg => "jpg",
            AttachmentKind::UriList => "uri",
        }
    }
}

/// A named artifact attached to a test or step
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub name: String,
    pub kind: AttachmentKind,
    pub content: Vec<u8>,
}

impl Attachment {
    /// Plain text attachment
    pub fn text(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttachmentKind::Text,
            content: body.into().into_bytes(),
        }
    }

    /// URI list attachment, one URI per line
    pub fn uri_list<S: AsRef<str>>(name: impl Into<String>, uris: &[S]) -> Self {
        let body = uris.iter().map(|u| u.as_ref()).collect::<Vec<_>>().join("\n");
        Self {
            name: name.into(),
            kind: AttachmentKind::UriList,
            content: body.into_bytes(),
        }
    }

    /// Image attachment
    pub fn image(name: impl Into<String>, kind: AttachmentKind, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            kind,
            content: bytes,
        }
    }

    /// Content as UTF-8, for textual kinds
    pub fn as_text(&self) -> Option<&str> {
        match self.kind {
            AttachmentKind::Text | AttachmentKind::UriList => std::str::from_utf8(&self.content).ok(),
            AttachmentKind::Png | AttachmentKind::Jpeg => None,
        }
    }
}

/// Failure details shown next to a failed test
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl StatusDetails {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            trace: None,
        }
    }
}

/// Result type for report operations
pub type ReportResult<T> = Result<T, ReportError>;

/// Error types for report operations
#[derive(Debug, Error)]
pub enum ReportError {
    /// The sink was used out of order (e.g., finishing a test that never started)
    #[error("Report state error: {0}")]
    State(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_list_joins_lines() {
        let att = Attachment::uri_list("URL", &["https://a.example", "https://b.example"]);
        assert_eq!(att.kind.mime(), "text/uri-list");
        assert_eq!(att.as_text(), Some("https://a.example\nhttps://b.example"));
    }

    #[test]
    fn test_image_has_no_text() {
        let att = Attachment::image("shot", AttachmentKind::Png, vec![0x89, b'P', b'N', b'G']);
        assert_eq!(att.as_text(), None);
        assert_eq!(att.kind.extension(), "png");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Status::Broken).unwrap(), "\"broken\"");
    }
}
