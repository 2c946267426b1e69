//! Helpers for naming collections and the fields stored per record.

use crate::error::{Result, VecDbError};

pub struct CollectionNames;

impl CollectionNames {
    /// Shortest collection name a Chroma server accepts.
    pub const MIN_NAME_LEN: usize = 3;
    /// Maximum allowed collection name length, shared by all backends.
    pub const MAX_NAME_LEN: usize = 512;

    /// Validate a logical collection name.
    ///
    /// Current rules (the intersection of what the supported backends accept):
    /// - must be between `MIN_NAME_LEN` and `MAX_NAME_LEN` bytes
    /// - must only contain ASCII letters, digits, `.`, `_` or `-`
    /// - must start and end with a letter or digit
    /// - must not contain `..` or be an IPv4 address
    pub fn validate(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(VecDbError::InvalidArgument(
                "collection name must not be empty".into(),
            ));
        }

        if name.len() < Self::MIN_NAME_LEN {
            return Err(VecDbError::InvalidArgument(format!(
                "collection name too short; needs at least {} characters",
                Self::MIN_NAME_LEN
            )));
        }

        if name.len() > Self::MAX_NAME_LEN {
            return Err(VecDbError::InvalidArgument(format!(
                "collection name too long; exceeds {} characters",
                Self::MAX_NAME_LEN
            )));
        }

        if !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
        {
            return Err(VecDbError::InvalidArgument(
                "collection name must match [a-zA-Z0-9._-]".into(),
            ));
        }

        let bytes = name.as_bytes();
        if !bytes[0].is_ascii_alphanumeric() || !bytes[bytes.len() - 1].is_ascii_alphanumeric() {
            return Err(VecDbError::InvalidArgument(
                "collection name must start and end with a letter or digit".into(),
            ));
        }

        if name.contains("..") {
            return Err(VecDbError::InvalidArgument(
                "collection name must not contain two consecutive periods".into(),
            ));
        }

        if name.parse::<std::net::Ipv4Addr>().is_ok() {
            return Err(VecDbError::InvalidArgument(
                "collection name must not be an IPv4 address".into(),
            ));
        }

        Ok(())
    }
}

/// Field names used when a backend stores records as free-form payloads.
pub struct CollectionFieldNames;

impl CollectionFieldNames {
    /// Caller-supplied record id, kept next to the backend's own point id.
    pub const RECORD_ID: &'static str = "record_id";
    /// Same key LangChain's Qdrant store uses, so existing collections stay readable.
    pub const DOCUMENT: &'static str = "page_content";
    pub const METADATA: &'static str = "metadata";
    /// Collection-level metadata keys on Chroma-compatible servers.
    pub const SPACE: &'static str = "hnsw:space";
    pub const DIMENSION: &'static str = "dimension";
}
