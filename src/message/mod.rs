//! Wire-format helpers for OGC messages.
//!
//! # Responsibilities
//! - Parse and serialize XML bodies (`xml.rs`)
//! - Evaluate path queries against a parsed document (`path.rs`)
//! - Parse and serialize key/value query strings (`kvp.rs`)
//!
//! # Design Decisions
//! - Documents are owned trees; no global namespace table exists
//! - Namespace scope is computed per element, per document
//! - KVP keys are matched case-insensitively but written back as received

pub mod kvp;
pub mod path;
pub mod xml;

pub use kvp::KvpParams;
pub use path::{select, select_string, PathValue};
pub use xml::{NamespaceScope, XmlDocument, XmlElement, XmlNode};

use thiserror::Error;

/// Errors raised while reading or querying a message.
#[derive(Debug, Error)]
pub enum MessageError {
    /// Body is not valid UTF-8.
    #[error("body is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    /// Body is not well-formed XML.
    #[error("malformed XML: {0}")]
    Xml(String),

    /// Path expression could not be parsed.
    #[error("invalid path expression '{path}': {reason}")]
    Path { path: String, reason: String },
}

impl From<quick_xml::Error> for MessageError {
    fn from(e: quick_xml::Error) -> Self {
        MessageError::Xml(e.to_string())
    }
}

pub type MessageResult<T> = Result<T, MessageError>;
