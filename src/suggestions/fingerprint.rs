//! Content fingerprints used as suggestion cache keys, computed with BLAKE3

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Hex-encoded cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Fingerprint {
    fn from(raw: &str) -> Self {
        Fingerprint(raw.to_string())
    }
}

impl From<String> for Fingerprint {
    fn from(raw: String) -> Self {
        Fingerprint(raw)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// NFC, lowercase, whitespace runs collapsed to one space, trimmed.
pub fn normalize_text(text: &str) -> String {
    let composed: String = text.nfc().collect();
    composed
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fingerprint = hash("page" || title_len || title || content_len || content)
///
/// Both parts are normalized first, so cosmetic whitespace or case changes map
/// to the same key.
pub fn fingerprint(content: &str, title: &str) -> Fingerprint {
    let title = normalize_text(title);
    let content = normalize_text(content);

    let mut hasher = Hasher::new();
    hasher.update(b"page");
    hasher.update(&(title.len() as u64).to_be_bytes());
    hasher.update(title.as_bytes());
    hasher.update(&(content.len() as u64).to_be_bytes());
    hasher.update(content.as_bytes());

    Fingerprint(hex::encode(hasher.finalize().as_bytes()))
}
