//! Object storage gateway: uploads attachments and hands back public URLs.

pub mod http;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::UploadError;

pub use http::HttpObjectStorage;

/// What an uploaded object is used for; selects its key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadCategory {
    Profile,
    Document,
}

impl UploadCategory {
    fn key_prefix(&self) -> &'static str {
        match self {
            Self::Profile => "profiles/profile_",
            Self::Document => "documents/doc_",
        }
    }
}

/// A binary file submitted with the profile form.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: &str, content_type: &str, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            bytes: bytes.into(),
        }
    }

    /// Lower-cased extension after the last dot, or empty if there is none.
    pub fn extension(&self) -> String {
        match self.file_name.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => String::new(),
        }
    }
}

/// Build a storage key that is unique per call:
/// `{prefix}{owner}_{random}.{ext}`.
pub fn object_key(owner: &str, category: UploadCategory, attachment: &Attachment) -> String {
    let token = Uuid::new_v4().simple();
    let ext = attachment.extension();
    if ext.is_empty() {
        format!("{}{owner}_{token}", category.key_prefix())
    } else {
        format!("{}{owner}_{token}.{ext}", category.key_prefix())
    }
}

/// Stateless upload contract.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload the attachment under a fresh key and return its public URL.
    async fn put(
        &self,
        owner: &str,
        category: UploadCategory,
        attachment: &Attachment,
    ) -> Result<String, UploadError>;
}
