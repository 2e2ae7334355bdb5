use sha2::{Digest, Sha256};

/// Reduces question text to the form used for exact-duplicate detection:
/// every whitespace character is removed, anything that is neither
/// alphanumeric nor a CJK ideograph is stripped, and the rest is lowercased.
pub fn normalize_content(content: &str) -> String {
    content
        .chars()
        .filter(|c| c.is_alphanumeric() || ('\u{4e00}'..='\u{9fff}').contains(c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// SHA-256 hex digest over the normalized content. Texts that normalize
/// identically always fingerprint identically.
pub fn content_fingerprint(content: &str) -> String {
    let normalized = normalize_content(content);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    format!("{digest:x}")
}
