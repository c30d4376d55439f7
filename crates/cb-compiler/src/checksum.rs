//! Adblock Plus list checksums.
//!
//! The checksum is the unpadded base64 MD5 of the list text after dropping
//! `\r`, collapsing blank lines and removing the checksum line itself.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use md5::{Digest, Md5};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChecksumError {
    #[error("checksum mismatch: list states {expected}, content hashes to {computed}")]
    Mismatch { expected: String, computed: String },
}

/// Outcome of a successful validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumStatus {
    Verified,
    /// The list carries no checksum line
    Absent,
}

/// Validate the embedded checksum, if there is one.
pub fn validate_checksum(text: &str) -> Result<ChecksumStatus, ChecksumError> {
    let expected = match find_checksum(text) {
        Some(expected) => expected.trim_end_matches('='),
        None => return Ok(ChecksumStatus::Absent),
    };

    let computed = compute_checksum(text);
    if computed == expected {
        Ok(ChecksumStatus::Verified)
    } else {
        Err(ChecksumError::Mismatch {
            expected: expected.to_string(),
            computed,
        })
    }
}

/// Value of the first checksum line in `text`.
pub fn find_checksum(text: &str) -> Option<&str> {
    text.lines().find_map(checksum_value)
}

/// Checksum of `text` as it would be stated in the list header.
pub fn compute_checksum(text: &str) -> String {
    let normalized = normalize(text);

    let mut hasher = Md5::new();
    for line in normalized.split_inclusive('\n') {
        // Only a newline-terminated checksum line is excluded
        if line.ends_with('\n') && checksum_value(line).is_some() {
            continue;
        }
        hasher.update(line.as_bytes());
    }

    STANDARD_NO_PAD.encode(hasher.finalize())
}

fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_newline = false;
    for ch in text.chars() {
        match ch {
            '\r' => continue,
            '\n' if last_was_newline => continue,
            '\n' => last_was_newline = true,
            _ => last_was_newline = false,
        }
        out.push(ch);
    }
    out
}

/// `! Checksum: <base64>` with any mix of spaces, `-` and `:` after the key.
fn checksum_value(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('!')?.trim_start();
    let key = rest.get(..8)?;
    if !key.eq_ignore_ascii_case("checksum") {
        return None;
    }

    let after_key = &rest[8..];
    let value = after_key.trim_start_matches(|c: char| c.is_whitespace() || c == '-' || c == ':');
    if value.len() == after_key.len() {
        return None;
    }

    let end = value
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '+' || c == '/' || c == '='))
        .unwrap_or(value.len());
    if end == 0 {
        return None;
    }
    Some(&value[..end])
}
