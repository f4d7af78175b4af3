use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Integrity metadata recorded for every exported file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactMetadata {
    /// Size of the file in bytes
    pub size: u64,
    /// MIME content type
    pub content_type: String,
    /// SHA-256 checksum of the file contents, hex encoded
    pub checksum: String,
}

impl ArtifactMetadata {
    pub fn new(data: &[u8], content_type: impl Into<String>) -> Self {
        Self {
            size: data.len() as u64,
            content_type: content_type.into(),
            checksum: Self::compute_checksum(data),
        }
    }

    /// Compute SHA-256 checksum of data
    pub fn compute_checksum(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Verify that data matches the stored checksum
    pub fn verify_checksum(&self, data: &[u8]) -> bool {
        Self::compute_checksum(data) == self.checksum
    }
}

/// Content type from a file name's extension.
pub fn detect_content_type(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("json") => "application/json",
        Some("jsonl") => "application/x-ndjson",
        Some("csv") => "text/csv",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}
