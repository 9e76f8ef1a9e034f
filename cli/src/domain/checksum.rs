//! Checksum algorithms shared by the local hasher and the remote verifier.

use serde::{Deserialize, Serialize};

use crate::domain::error::TransferError;
use crate::domain::shell::quote;

/// Content hash used to compare a local archive with its remote copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// MD5, matching the `md5sum` present on every base image.
    #[default]
    Md5,
    Sha256,
}

impl ChecksumAlgorithm {
    /// Remote command that prints the digest of `path`.
    #[must_use]
    pub fn remote_command(self, path: &str) -> String {
        let tool = match self {
            Self::Md5 => "md5sum",
            Self::Sha256 => "sha256sum",
        };
        format!("{tool} -- {}", quote(path))
    }

    /// Length of the hex digest.
    #[must_use]
    pub fn hex_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha256 => 64,
        }
    }

    /// Extract the digest from `md5sum`/`sha256sum` output.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::UnparseableChecksum` when the first token is not
    /// a hex digest of the expected length.
    pub fn parse_remote(self, stdout: &str) -> Result<String, TransferError> {
        let token = stdout
            .split_whitespace()
            .next()
            .map(|t| t.trim_start_matches('\\').to_ascii_lowercase())
            .unwrap_or_default();
        if token.len() == self.hex_len() && token.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(token)
        } else {
            Err(TransferError::UnparseableChecksum(stdout.to_owned()))
        }
    }
}

/// Encode bytes as a lowercase hex string.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}
