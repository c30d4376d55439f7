//! URL slicing for the hot path.
//!
//! Requests are matched many thousands of times per page, so nothing here
//! runs a full URL parser. Everything works on byte offsets into the original
//! string.

use std::ops::Range;

use crate::hash::hash_token;

/// Shortest alphanumeric run that is worth indexing.
pub const MIN_TOKEN_LEN: usize = 3;

/// Offset of the authority, just past `scheme://`. `data:` URLs have no
/// slashes and start right after the colon.
fn authority_start(url: &str) -> Option<usize> {
    let colon = url.find(':')?;
    let scheme = &url[..colon];
    if url[colon + 1..].starts_with("//") {
        Some(colon + 3)
    } else if scheme.eq_ignore_ascii_case("data") {
        Some(colon + 1)
    } else {
        None
    }
}

/// Byte range of the hostname inside `url`.
///
/// Userinfo before `@` and a trailing `:port` are excluded. Bracketed IPv6
/// literals keep their brackets.
pub fn host_range(url: &str) -> Option<Range<usize>> {
    let start = authority_start(url)?;
    let bytes = url.as_bytes();
    let authority_end = bytes[start..]
        .iter()
        .position(|&b| matches!(b, b'/' | b'?' | b'#'))
        .map_or(bytes.len(), |p| start + p);

    let host_start = bytes[start..authority_end]
        .iter()
        .rposition(|&b| b == b'@')
        .map_or(start, |p| start + p + 1);

    let host_end = if bytes.get(host_start) == Some(&b'[') {
        bytes[host_start..authority_end]
            .iter()
            .position(|&b| b == b']')
            .map_or(authority_end, |p| host_start + p + 1)
    } else {
        bytes[host_start..authority_end]
            .iter()
            .position(|&b| b == b':')
            .map_or(authority_end, |p| host_start + p)
    };

    Some(host_start..host_end)
}

/// Hostname slice of `url`, if it has a non-empty one.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    host_range(url).map(|r| &url[r]).filter(|h| !h.is_empty())
}

/// Lowercased host of `url`, or an empty string when there is none.
pub fn host_of(url: &str) -> String {
    extract_host(url)
        .map(|h| h.trim_end_matches('.').to_ascii_lowercase())
        .unwrap_or_default()
}

/// Hashes of every alphanumeric run of at least [`MIN_TOKEN_LEN`] bytes,
/// sorted and deduplicated. Expects a lowercased URL.
pub fn tokenize_url(url_lower: &str) -> Vec<u32> {
    let mut tokens: Vec<u32> = url_lower
        .as_bytes()
        .split(|b| !b.is_ascii_alphanumeric())
        .filter(|run| run.len() >= MIN_TOKEN_LEN)
        .map(hash_token)
        .collect();
    tokens.sort_unstable();
    tokens.dedup();
    tokens
}

/// ABP `^`: anything except letters, digits and `_ - . %`.
#[inline]
pub fn is_separator_char(c: u8) -> bool {
    !(c.is_ascii_alphanumeric() || matches!(c, b'_' | b'-' | b'.' | b'%'))
}

/// `^` also matches the end of the URL.
#[inline]
pub fn is_at_separator(s: &[u8], pos: usize) -> bool {
    s.get(pos).map_or(true, |&c| is_separator_char(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_excludes_port_and_userinfo() {
        assert_eq!(extract_host("https://ads.example.com/banner.gif"), Some("ads.example.com"));
        assert_eq!(extract_host("http://tracker.net:8080/p"), Some("tracker.net"));
        assert_eq!(extract_host("https://user:pw@cdn.example.org/x"), Some("cdn.example.org"));
        assert_eq!(extract_host("https://example.com?next=a@b"), Some("example.com"));
        assert_eq!(extract_host("http://[::1]:3000/"), Some("[::1]"));
    }

    #[test]
    fn host_missing_for_junk_input() {
        assert_eq!(extract_host("not a url"), None);
        assert_eq!(extract_host("mailto:someone"), None);
        assert_eq!(extract_host("https:///path"), None);
        assert_eq!(host_of(""), "");
    }

    #[test]
    fn host_of_normalizes_case_and_root_dot() {
        assert_eq!(host_of("HTTPS://Ads.Example.COM./x"), "ads.example.com");
    }

    #[test]
    fn host_range_points_into_the_url() {
        assert_eq!(host_range("https://example.com/path"), Some(8..19));
    }

    #[test]
    fn tokens_skip_short_runs() {
        let tokens = tokenize_url("https://example.com/ads/analytics.js?id=7");
        assert!(tokens.contains(&hash_token(b"analytics")));
        assert!(tokens.contains(&hash_token(b"ads")));
        assert!(!tokens.contains(&hash_token(b"js")));
        assert!(!tokens.contains(&hash_token(b"id")));
    }

    #[test]
    fn separator_positions() {
        assert!(is_at_separator(b"ads", 3));
        assert!(is_at_separator(b"ads/x", 3));
        assert!(is_at_separator(b"ads:80", 3));
        assert!(is_at_separator(b"ads?q", 3));
        assert!(!is_at_separator(b"ads", 1));
        assert!(!is_at_separator(b"ads.js", 3));
        assert!(!is_at_separator(b"ads-js", 3));
        assert!(!is_at_separator(b"ads%20", 3));
    }
}
