//! Compiled URL patterns.
//!
//! Patterns are compiled once when a profile is loaded. Wildcard patterns
//! become a short token program (literal / `*` / `^`) with optional anchors;
//! `/.../` patterns become a full regular expression.

use regex::{Regex, RegexBuilder};

use crate::url::{host_range, is_at_separator, MIN_TOKEN_LEN};

/// Error raised when a pattern cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("invalid regular expression: {0}")]
    InvalidRegex(String),
}

/// Where the start of a wildcard pattern is pinned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeftAnchor {
    #[default]
    None,
    /// `|http://` - start of the URL
    Start,
    /// `||domain` - start of a hostname label
    Hostname,
}

/// One step of a wildcard pattern program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternToken {
    /// Find literal substring
    Literal(String),
    /// Skip any chars (for * wildcard)
    Wildcard,
    /// ABP `^` separator: one separator char, or the end of the URL
    Separator,
}

/// Simplified matcher for `*`, `^`, `|` and `||` patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPattern {
    pub left: LeftAnchor,
    pub right_anchor: bool,
    pub tokens: Vec<PatternToken>,
}

/// A pattern ready for matching.
#[derive(Debug, Clone)]
pub enum CompiledPattern {
    Wildcard(WildcardPattern),
    Regex(Regex),
}

impl CompiledPattern {
    /// Compile the pattern part of a network rule (options already removed).
    pub fn compile(pattern: &str, match_case: bool) -> Result<Self, PatternError> {
        if let Some(source) = regex_source(pattern) {
            let regex = RegexBuilder::new(source)
                .case_insensitive(!match_case)
                .build()
                .map_err(|e| PatternError::InvalidRegex(e.to_string()))?;
            return Ok(Self::Regex(regex));
        }

        Ok(Self::Wildcard(WildcardPattern::compile(pattern, match_case)))
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, Self::Regex(_))
    }

    /// Match against a URL. `url_lower` must be `url` lowercased.
    #[inline]
    pub fn matches(&self, url: &str, url_lower: &str, match_case: bool) -> bool {
        match self {
            Self::Regex(regex) => regex.is_match(url),
            Self::Wildcard(pattern) => {
                let haystack = if match_case { url } else { url_lower };
                pattern.matches(haystack)
            }
        }
    }
}

/// `/.../` patterns are regular expressions. A pattern like `/banner/` with
/// no regex metacharacters is still compiled as a regex.
fn regex_source(pattern: &str) -> Option<&str> {
    if pattern.len() > 2 && pattern.starts_with('/') && pattern.ends_with('/') {
        Some(&pattern[1..pattern.len() - 1])
    } else {
        None
    }
}

impl WildcardPattern {
    pub fn compile(pattern: &str, match_case: bool) -> Self {
        let (left, rest) = if let Some(rest) = pattern.strip_prefix("||") {
            (LeftAnchor::Hostname, rest)
        } else if let Some(rest) = pattern.strip_prefix('|') {
            (LeftAnchor::Start, rest)
        } else {
            (LeftAnchor::None, pattern)
        };

        let (right_anchor, rest) = match rest.strip_suffix('|') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };

        let text = if match_case {
            rest.to_string()
        } else {
            rest.to_ascii_lowercase()
        };

        let mut tokens = Vec::new();
        let mut literal = String::new();
        for ch in text.chars() {
            match ch {
                '*' => {
                    if !literal.is_empty() {
                        tokens.push(PatternToken::Literal(std::mem::take(&mut literal)));
                    }
                    if tokens.last() != Some(&PatternToken::Wildcard) {
                        tokens.push(PatternToken::Wildcard);
                    }
                }
                '^' => {
                    if !literal.is_empty() {
                        tokens.push(PatternToken::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(PatternToken::Separator);
                }
                _ => literal.push(ch),
            }
        }
        if !literal.is_empty() {
            tokens.push(PatternToken::Literal(literal));
        }

        Self {
            left,
            right_anchor,
            tokens,
        }
    }

    /// A bare substring with no anchors or wildcards.
    pub fn is_plain(&self) -> bool {
        self.left == LeftAnchor::None
            && !self.right_anchor
            && matches!(self.tokens.as_slice(), [PatternToken::Literal(_)])
    }

    pub fn matches(&self, url: &str) -> bool {
        let hay = url.as_bytes();
        let mut run = ProgramRun::new(&self.tokens, hay, self.right_anchor);
        match self.left {
            LeftAnchor::None => run.floating(0, 0),
            LeftAnchor::Start => run.pinned(0, 0),
            LeftAnchor::Hostname => {
                let Some(host) = host_range(url) else {
                    return false;
                };
                if run.pinned(0, host.start) {
                    return true;
                }
                host.filter(|&i| hay[i] == b'.').any(|i| run.pinned(0, i + 1))
            }
        }
    }

    /// Host named by a `||host^` style pattern, if the pattern pins it
    /// exactly: the host part must be followed by `^`, `/`, `:`, `?` or a
    /// right anchor, so only requests to that host or its subdomains can match.
    pub fn anchored_host(&self) -> Option<&str> {
        if self.left != LeftAnchor::Hostname {
            return None;
        }
        let (first, rest) = self.tokens.split_first()?;
        let literal = match first {
            PatternToken::Literal(literal) => literal.as_str(),
            _ => return None,
        };

        let (host, terminated) = match literal.find(['/', ':', '?']) {
            Some(end) => (&literal[..end], true),
            None => {
                let terminated = match rest.first() {
                    Some(PatternToken::Separator) => true,
                    None => self.right_anchor,
                    _ => false,
                };
                (literal, terminated)
            }
        };

        let valid = !host.is_empty()
            && !host.starts_with('.')
            && !host.ends_with('.')
            && host.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-');

        if terminated && valid {
            Some(host)
        } else {
            None
        }
    }

    /// Alphanumeric runs that every matching URL must contain as a whole
    /// token. These are the only safe keys for the token index.
    pub fn index_tokens(&self) -> Vec<&str> {
        let mut out = Vec::new();

        for (i, token) in self.tokens.iter().enumerate() {
            let literal = match token {
                PatternToken::Literal(literal) => literal.as_str(),
                _ => continue,
            };
            let bytes = literal.as_bytes();

            // Is the byte just before this literal guaranteed to be a separator?
            let left_closed = match i.checked_sub(1).map(|p| &self.tokens[p]) {
                Some(PatternToken::Separator) => true,
                Some(_) => false,
                None => self.left != LeftAnchor::None,
            };
            let right_closed = match self.tokens.get(i + 1) {
                Some(PatternToken::Separator) => true,
                Some(_) => false,
                None => self.right_anchor,
            };

            let mut start = None;
            for pos in 0..=bytes.len() {
                let alnum = pos < bytes.len() && bytes[pos].is_ascii_alphanumeric();
                if alnum {
                    if start.is_none() {
                        start = Some(pos);
                    }
                    continue;
                }
                if let Some(s) = start.take() {
                    let closed_left = s > 0 || left_closed;
                    let closed_right = pos < bytes.len() || right_closed;
                    if closed_left && closed_right && pos - s >= MIN_TOKEN_LEN {
                        out.push(&literal[s..pos]);
                    }
                }
            }
        }

        out
    }
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// One run of a token program over a URL.
///
/// `pinned(i, pos)` asks whether tokens `i..` match with token `i` starting
/// exactly at `pos`; `floating(i, pos)` lets token `i` start anywhere at or
/// after `pos`. Failed pinned states are remembered, and a floating failure
/// at `pos` rules out every later start, so each state is decided once and
/// the run stays polynomial however many `*` the pattern has.
struct ProgramRun<'a> {
    tokens: &'a [PatternToken],
    hay: &'a [u8],
    right_anchor: bool,
    width: usize,
    pinned_failed: Vec<bool>,
    floating_fails_from: Vec<usize>,
}

impl<'a> ProgramRun<'a> {
    fn new(tokens: &'a [PatternToken], hay: &'a [u8], right_anchor: bool) -> Self {
        let width = hay.len() + 1;
        Self {
            tokens,
            hay,
            right_anchor,
            width,
            pinned_failed: vec![false; (tokens.len() + 1) * width],
            floating_fails_from: vec![usize::MAX; tokens.len() + 1],
        }
    }

    fn pinned(&mut self, i: usize, pos: usize) -> bool {
        let slot = i * self.width + pos;
        if self.pinned_failed[slot] {
            return false;
        }
        let matched = self.step(i, pos);
        if !matched {
            self.pinned_failed[slot] = true;
        }
        matched
    }

    fn step(&mut self, i: usize, pos: usize) -> bool {
        let (tokens, hay) = (self.tokens, self.hay);
        match tokens.get(i) {
            None => !self.right_anchor || pos == hay.len(),
            Some(PatternToken::Wildcard) => self.floating(i + 1, pos),
            Some(PatternToken::Literal(literal)) => {
                let needle = literal.as_bytes();
                hay[pos..].starts_with(needle) && self.pinned(i + 1, pos + needle.len())
            }
            Some(PatternToken::Separator) => {
                is_at_separator(hay, pos) && self.pinned(i + 1, (pos + 1).min(hay.len()))
            }
        }
    }

    fn floating(&mut self, i: usize, pos: usize) -> bool {
        let (tokens, hay) = (self.tokens, self.hay);
        let Some(token) = tokens.get(i) else {
            return true;
        };
        let limit = self.floating_fails_from[i].min(hay.len() + 1);
        if pos >= limit {
            return false;
        }

        let found = match token {
            PatternToken::Literal(literal) => {
                let needle = literal.as_bytes();
                let mut from = pos;
                loop {
                    if from >= limit {
                        break false;
                    }
                    match find_bytes(&hay[from..], needle) {
                        Some(offset) if from + offset < limit => {
                            let start = from + offset;
                            if self.pinned(i, start) {
                                break true;
                            }
                            from = start + 1;
                        }
                        _ => break false,
                    }
                }
            }
            _ => (pos..limit).any(|p| self.pinned(i, p)),
        };

        if !found {
            self.floating_fails_from[i] = pos;
        }
        found
    }
}
