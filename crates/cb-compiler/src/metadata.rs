//! Filter list header metadata (`! Title: ...` comments).

use std::time::Duration;

/// Header fields found in a list's leading comments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMetadata {
    pub title: Option<String>,
    pub homepage: Option<String>,
    pub version: Option<String>,
    /// Raw `! Expires:` value, e.g. `4 days (update frequency)`
    pub expires: Option<String>,
    /// Value of the `! Checksum:` line, if the list carries one
    pub checksum: Option<String>,
}

impl ListMetadata {
    /// Record a comment line. Only `! Key: value` lines are recognized.
    pub fn observe_comment(&mut self, line: &str) {
        let body = match line.strip_prefix('!') {
            Some(body) => body.trim(),
            None => return,
        };
        let (key, value) = match body.split_once(':') {
            Some((key, value)) => (key.trim().to_ascii_lowercase(), value.trim()),
            None => return,
        };
        if value.is_empty() {
            return;
        }

        let slot = match key.as_str() {
            "title" => &mut self.title,
            "homepage" => &mut self.homepage,
            "version" => &mut self.version,
            "expires" => &mut self.expires,
            "checksum" => &mut self.checksum,
            _ => return,
        };
        // First occurrence wins
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }

    /// Parsed `! Expires:` interval. Understands `N day(s)` and `N hour(s)`.
    pub fn expires_after(&self) -> Option<Duration> {
        let raw = self.expires.as_deref()?;
        let mut words = raw.split_whitespace();
        let amount: u64 = words.next()?.parse().ok()?;
        if amount == 0 {
            return None;
        }
        let unit = words.next().unwrap_or("days").to_ascii_lowercase();

        let unit_secs = if unit.starts_with('d') {
            24 * 60 * 60
        } else if unit.starts_with('h') {
            60 * 60
        } else {
            return None;
        };
        amount.checked_mul(unit_secs).map(Duration::from_secs)
    }
}
