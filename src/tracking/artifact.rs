//! Model Artifact - serialized model bytes fetched from a run

use sha2::{Digest, Sha256};

/// Serialized model retrieved from a run's artifact store.
///
/// ## Digest Format
///
/// The digest follows the content-addressable format `algorithm:hex_digest`,
/// e.g. `sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855`.
/// It is logged at startup so the served model can be traced back to bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifact {
    run_id: String,
    path: String,
    bytes: Vec<u8>,
    digest: String,
}

impl ModelArtifact {
    /// Wrap downloaded artifact bytes, computing their digest.
    #[must_use]
    pub fn new(run_id: impl Into<String>, path: impl Into<String>, bytes: Vec<u8>) -> Self {
        let digest = format!("sha256:{}", hex::encode(Sha256::digest(&bytes)));
        Self {
            run_id: run_id.into(),
            path: path.into(),
            bytes,
            digest,
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the artifact path relative to the run's artifact root.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the raw artifact bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get the artifact size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Get the content digest.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }
}
