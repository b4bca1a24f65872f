//! The digest/size record produced for each layer.

use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::error::{LayerInfoError, Result};

/// Algorithm prefix carried by every finalized digest.
pub const SHA256_PREFIX: &str = "sha256:";

/// One layer as seen by a registry: its distribution digest and uncompressed size.
///
/// Two records describe the same layer iff their digests are equal; the size is not part of
/// the identity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerRecord {
    /// Distribution digest, always of the form `sha256:<hex>`.
    pub digest: String,
    /// Uncompressed size of the layer in bytes.
    pub size_bytes: i64,
}

impl LayerRecord {
    /// Builds a record from a raw digest as it is named on disk (without algorithm prefix).
    pub(crate) fn from_raw_digest(raw_digest: &str, size_bytes: i64) -> Self {
        Self {
            digest: format!("{SHA256_PREFIX}{raw_digest}"),
            size_bytes,
        }
    }
}

impl PartialEq for LayerRecord {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl Eq for LayerRecord {}

impl Hash for LayerRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

/// Normalizes a user-supplied digest into the `sha256:<hex>` form used by [`LayerRecord`].
///
/// Accepts either a prefixed digest or a bare hex string.  The hex part must be exactly 64
/// characters of [0-9a-f], case insensitive; it is lowercased on output.
pub fn normalize_digest(digest: &str) -> Result<String> {
    let hex_part = digest.strip_prefix(SHA256_PREFIX).unwrap_or(digest);
    let mut value = [0u8; 32];
    hex::decode_to_slice(hex_part, &mut value)
        .map_err(|_| LayerInfoError::InvalidDigest(digest.to_string()))?;
    Ok(format!("{SHA256_PREFIX}{}", hex::encode(value)))
}
