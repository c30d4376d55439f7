use std::net::IpAddr;

use cb_core::pattern::{CompiledPattern, PatternError};
use cb_core::rule::{CosmeticRule, DomainScope, FilterRule, RuleEntry};
use cb_core::types::{RequestType, RuleFlags, RuleKind, ThirdPartyConstraint};

use crate::metadata::ListMetadata;

/// Why a single line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("comment line")]
    Comment,
    #[error("rule has no pattern")]
    EmptyPattern,
    #[error("malformed option list `{0}`")]
    MalformedOptions(String),
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    #[error("`domain=` option lists no domains")]
    EmptyDomainOption,
    #[error("invalid domain `{0}`")]
    InvalidDomain(String),
    #[error("options exclude every resource type")]
    EmptyTypeMask,
    #[error("conflicting third-party options")]
    ConflictingPartyOptions,
    #[error("empty element hiding selector")]
    EmptySelector,
    #[error("unsupported rule syntax `{0}`")]
    UnsupportedSyntax(String),
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// A rejected line, for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineError {
    /// 1-based line number in the list text
    pub line_number: usize,
    pub line: String,
    pub error: ParseError,
}

/// Result of parsing a whole filter list.
#[derive(Debug, Clone, Default)]
pub struct ParsedList {
    pub entries: Vec<RuleEntry>,
    pub metadata: ListMetadata,
    pub errors: Vec<LineError>,
    pub line_count: usize,
}

/// Parse a full filter list. Bad lines are logged and skipped; they never
/// abort the rest of the list.
pub fn parse_filter_list(text: &str) -> ParsedList {
    let mut parsed = ParsedList::default();

    for (idx, raw_line) in text.lines().enumerate() {
        parsed.line_count += 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if is_comment_line(line) {
            parsed.metadata.observe_comment(line);
            continue;
        }

        match parse_rule(line) {
            Ok(entry) => parsed.entries.push(entry),
            Err(error) => {
                log::warn!("Skipping filter line {}: {} ({})", idx + 1, line, error);
                parsed.errors.push(LineError {
                    line_number: idx + 1,
                    line: line.to_string(),
                    error,
                });
            }
        }
    }

    parsed
}

/// Parse one filter-list line.
pub fn parse_rule(line: &str) -> Result<RuleEntry, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }
    if is_comment_line(line) {
        return Err(ParseError::Comment);
    }

    if let Some(marker) = find_cosmetic_marker(line) {
        return parse_cosmetic_rule(line, marker).map(RuleEntry::Cosmetic);
    }

    parse_network_rule(line).map(RuleEntry::Network)
}

fn is_comment_line(line: &str) -> bool {
    if line.starts_with('!') || line.starts_with('[') {
        return true;
    }
    // Hosts-file comments; `##` / `#@#` lines are global cosmetic rules
    match line.strip_prefix('#') {
        Some(rest) => !rest.starts_with(['#', '@', '?', '$', '%']),
        None => false,
    }
}

// =============================================================================
// Cosmetic Rules
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CosmeticMarker {
    start: usize,
    len: usize,
    is_exception: bool,
    supported: bool,
}

fn find_cosmetic_marker(line: &str) -> Option<CosmeticMarker> {
    const MARKERS: &[(&str, bool, bool)] = &[
        ("#@#", true, true),
        ("##", false, true),
        ("#@?#", true, false),
        ("#?#", false, false),
        ("#@$#", true, false),
        ("#$#", false, false),
        ("#@%#", true, false),
        ("#%#", false, false),
    ];

    MARKERS
        .iter()
        .filter_map(|&(marker, is_exception, supported)| {
            line.find(marker).map(|start| CosmeticMarker {
                start,
                len: marker.len(),
                is_exception,
                supported,
            })
        })
        .min_by_key(|m| (m.start, std::cmp::Reverse(m.len)))
}

fn parse_cosmetic_rule(line: &str, marker: CosmeticMarker) -> Result<CosmeticRule, ParseError> {
    if !marker.supported {
        return Err(ParseError::UnsupportedSyntax(line[marker.start..marker.start + marker.len].to_string()));
    }

    let domain_part = &line[..marker.start];
    let selector = line[marker.start + marker.len..].trim();

    if selector.is_empty() {
        return Err(ParseError::EmptySelector);
    }
    if selector.starts_with("+js(") || selector.starts_with('^') {
        return Err(ParseError::UnsupportedSyntax(selector.to_string()));
    }

    let mut domains = DomainScope::default();
    for raw in domain_part.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let (is_exclude, domain_raw) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let domain = normalize_domain(domain_raw).ok_or_else(|| ParseError::InvalidDomain(raw.to_string()))?;
        if is_exclude {
            domains.exclude.push(domain);
        } else {
            domains.include.push(domain);
        }
    }

    Ok(CosmeticRule {
        raw: line.to_string(),
        domains,
        selector: selector.to_string(),
        is_exception: marker.is_exception,
    })
}

// =============================================================================
// Network Rules
// =============================================================================

fn parse_network_rule(line: &str) -> Result<FilterRule, ParseError> {
    let (kind, body) = match line.strip_prefix("@@") {
        Some(rest) => (RuleKind::Exception, rest.trim_start()),
        None => (RuleKind::Block, line),
    };

    if kind == RuleKind::Block {
        if let Some(domain) = parse_hosts_file_domain(body) {
            return build_network_rule(line, kind, &format!("||{domain}^"), ParsedOptions::default());
        }
    }

    let (pattern_part, options_text) = split_rule_options(body);
    let options = match options_text {
        Some(options_text) => parse_options(options_text)?,
        None => ParsedOptions::default(),
    };

    let pattern = pattern_part.trim();
    if pattern.is_empty() && options_text.is_none() {
        return Err(ParseError::EmptyPattern);
    }

    build_network_rule(line, kind, pattern, options)
}

fn build_network_rule(
    raw: &str,
    kind: RuleKind,
    pattern: &str,
    options: ParsedOptions,
) -> Result<FilterRule, ParseError> {
    let compiled = CompiledPattern::compile(pattern, options.match_case)?;

    let mut flags = RuleFlags::empty();
    if options.match_case {
        flags |= RuleFlags::MATCH_CASE;
    }
    if compiled.is_regex() {
        flags |= RuleFlags::IS_REGEX;
    } else {
        if pattern.starts_with("||") {
            flags |= RuleFlags::HAS_HOST_ANCHOR;
        } else if pattern.starts_with('|') {
            flags |= RuleFlags::HAS_LEFT_ANCHOR;
        }
        if pattern.len() > 1 && pattern.ends_with('|') {
            flags |= RuleFlags::HAS_RIGHT_ANCHOR;
        }
    }

    Ok(FilterRule {
        raw: raw.to_string(),
        kind,
        pattern: compiled,
        domains: options.domains,
        type_mask: options.type_mask,
        third_party: options.third_party,
        flags,
    })
}

#[derive(Debug, Clone)]
struct ParsedOptions {
    match_case: bool,
    type_mask: RequestType,
    third_party: ThirdPartyConstraint,
    domains: DomainScope,
}

impl Default for ParsedOptions {
    fn default() -> Self {
        Self {
            match_case: false,
            type_mask: RequestType::DEFAULT,
            third_party: ThirdPartyConstraint::Any,
            domains: DomainScope::default(),
        }
    }
}

/// Options start at the last `$`, unless the whole pattern is a `/regex/`.
fn split_rule_options(line: &str) -> (&str, Option<&str>) {
    if line.len() > 2 && line.starts_with('/') && line.ends_with('/') {
        return (line, None);
    }
    match line.rfind('$') {
        Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
        None => (line, None),
    }
}

fn parse_options(text: &str) -> Result<ParsedOptions, ParseError> {
    let mut match_case = false;
    let mut type_include = RequestType::empty();
    let mut type_exclude = RequestType::empty();
    let mut third_party: Option<ThirdPartyConstraint> = None;
    let mut domains = DomainScope::default();

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError::MalformedOptions(text.to_string()));
    }

    for raw in trimmed.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ParseError::MalformedOptions(text.to_string()));
        }

        let raw_lower = raw.to_ascii_lowercase();
        let raw_lower = raw_lower.as_str();

        if raw_lower == "match-case" || raw_lower == "match_case" {
            match_case = true;
            continue;
        }

        if let Some(domain_value) = raw_lower.strip_prefix("domain=") {
            let parsed = parse_domain_option(domain_value)?;
            domains.include.extend(parsed.include);
            domains.exclude.extend(parsed.exclude);
            continue;
        }

        let (negated, name) = match raw_lower.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw_lower),
        };

        if let Some(mask) = RequestType::from_type_name(name) {
            if negated {
                type_exclude |= mask;
            } else {
                type_include |= mask;
            }
            continue;
        }

        if let Some(is_third) = party_option(name) {
            let constraint = if is_third != negated {
                ThirdPartyConstraint::OnlyThirdParty
            } else {
                ThirdPartyConstraint::OnlyFirstParty
            };
            match third_party {
                Some(existing) if existing != constraint => return Err(ParseError::ConflictingPartyOptions),
                _ => third_party = Some(constraint),
            }
            continue;
        }

        return Err(ParseError::UnknownOption(raw.to_string()));
    }

    Ok(ParsedOptions {
        match_case,
        type_mask: finalize_type_mask(type_include, type_exclude)?,
        third_party: third_party.unwrap_or_default(),
        domains,
    })
}

fn parse_domain_option(value: &str) -> Result<DomainScope, ParseError> {
    let mut scope = DomainScope::default();

    for raw in value.split('|') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let (is_exclude, domain_raw) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let domain = normalize_domain(domain_raw).ok_or_else(|| ParseError::InvalidDomain(raw.to_string()))?;

        if is_exclude {
            scope.exclude.push(domain);
        } else {
            scope.include.push(domain);
        }
    }

    if scope.is_unrestricted() {
        return Err(ParseError::EmptyDomainOption);
    }

    Ok(scope)
}

fn finalize_type_mask(include: RequestType, exclude: RequestType) -> Result<RequestType, ParseError> {
    let mask = if include.is_empty() {
        RequestType::DEFAULT & !exclude
    } else {
        include & !exclude
    };
    if mask.is_empty() {
        return Err(ParseError::EmptyTypeMask);
    }
    Ok(mask)
}

/// `Some(true)` for third-party spellings, `Some(false)` for first-party ones.
fn party_option(name: &str) -> Option<bool> {
    match name {
        "third-party" | "thirdparty" | "3p" => Some(true),
        "first-party" | "firstparty" | "1p" => Some(false),
        _ => None,
    }
}

fn parse_hosts_file_domain(line: &str) -> Option<String> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    let second = parts.next()?;

    if first.parse::<IpAddr>().is_ok() {
        return normalize_domain(second);
    }

    None
}

pub(crate) fn normalize_domain(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_')
    {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(line: &str) -> FilterRule {
        match parse_rule(line) {
            Ok(RuleEntry::Network(rule)) => rule,
            other => panic!("expected network rule for {line}, got {other:?}"),
        }
    }

    fn cosmetic(line: &str) -> CosmeticRule {
        match parse_rule(line) {
            Ok(RuleEntry::Cosmetic(rule)) => rule,
            other => panic!("expected cosmetic rule for {line}, got {other:?}"),
        }
    }

    #[test]
    fn parses_block_rule_with_type_option() {
        let rule = network("||ads.example.com^$script");
        assert_eq!(rule.kind, RuleKind::Block);
        assert_eq!(rule.type_mask, RequestType::SCRIPT);
        assert!(rule.flags.contains(RuleFlags::HAS_HOST_ANCHOR));
        assert_eq!(rule.raw, "||ads.example.com^$script");
    }

    #[test]
    fn parses_exception_rule() {
        let rule = network("@@||ads.example.com/allow.js$script");
        assert!(rule.is_exception());
        assert_eq!(rule.type_mask, RequestType::SCRIPT);
    }

    #[test]
    fn default_and_negated_type_masks() {
        assert_eq!(network("/banner/*").type_mask, RequestType::DEFAULT);

        let rule = network("/banner/*$~image");
        assert!(!rule.type_mask.contains(RequestType::IMAGE));
        assert!(!rule.type_mask.contains(RequestType::POPUP));
        assert!(rule.type_mask.contains(RequestType::SCRIPT));

        assert_eq!(network("||pop.example.com^$popup").type_mask, RequestType::POPUP);
        assert_eq!(parse_rule("/x/*$script,~script").unwrap_err(), ParseError::EmptyTypeMask);
    }

    #[test]
    fn parses_domain_option() {
        let rule = network("/ads/*$domain=example.com|~shop.example.com|Other.ORG");
        assert_eq!(rule.domains.include, vec!["example.com", "other.org"]);
        assert_eq!(rule.domains.exclude, vec!["shop.example.com"]);
        assert_eq!(parse_rule("/ads/*$domain=").unwrap_err(), ParseError::EmptyDomainOption);
        assert!(matches!(parse_rule("/ads/*$domain=bad/host"), Err(ParseError::InvalidDomain(_))));
    }

    #[test]
    fn parses_party_and_case_options() {
        assert_eq!(network("/t/*$third-party").third_party, ThirdPartyConstraint::OnlyThirdParty);
        assert_eq!(network("/t/*$~third-party").third_party, ThirdPartyConstraint::OnlyFirstParty);
        assert_eq!(network("/t/*$1p").third_party, ThirdPartyConstraint::OnlyFirstParty);
        assert_eq!(
            parse_rule("/t/*$third-party,first-party").unwrap_err(),
            ParseError::ConflictingPartyOptions
        );
        assert!(network("/Ads/*$match-case").match_case());
    }

    #[test]
    fn rejects_unknown_and_malformed_options() {
        assert_eq!(
            parse_rule("||example.com^$important").unwrap_err(),
            ParseError::UnknownOption("important".to_string())
        );
        assert!(matches!(parse_rule("||example.com^$csp=script-src"), Err(ParseError::UnknownOption(_))));
        assert!(matches!(parse_rule("||example.com^$script,,image"), Err(ParseError::MalformedOptions(_))));
        assert!(matches!(parse_rule("||example.com^$"), Err(ParseError::MalformedOptions(_))));
    }

    #[test]
    fn regex_rules() {
        let rule = network(r"/banner\d+\.gif$/");
        assert!(rule.is_regex());
        assert!(matches!(parse_rule("/[unclosed/"), Err(ParseError::Pattern(_))));
    }

    #[test]
    fn options_after_regex_pattern() {
        let rule = network(r"/track\d+/$image");
        assert!(rule.is_regex());
        assert_eq!(rule.type_mask, RequestType::IMAGE);
    }

    #[test]
    fn parses_hosts_file_lines() {
        let rule = network("0.0.0.0 tracker.example.net");
        assert_eq!(rule.raw, "0.0.0.0 tracker.example.net");
        assert!(rule.flags.contains(RuleFlags::HAS_HOST_ANCHOR));
    }

    #[test]
    fn parses_cosmetic_rules() {
        let rule = cosmetic("##.ad-banner");
        assert!(rule.domains.is_unrestricted());
        assert_eq!(rule.selector, ".ad-banner");
        assert!(!rule.is_exception);

        let rule = cosmetic("news.example.com#@#.ad-banner");
        assert!(rule.is_exception);
        assert_eq!(rule.domains.include, vec!["news.example.com"]);

        let rule = cosmetic("example.com,~shop.example.com##div[id^=\"ad\"]");
        assert_eq!(rule.domains.include, vec!["example.com"]);
        assert_eq!(rule.domains.exclude, vec!["shop.example.com"]);
        assert_eq!(rule.selector, "div[id^=\"ad\"]");
    }

    #[test]
    fn rejects_unsupported_cosmetic_syntax() {
        assert!(matches!(parse_rule("example.com#?#div:-abp-has(.ad)"), Err(ParseError::UnsupportedSyntax(_))));
        assert!(matches!(parse_rule("example.com##+js(nowebrtc)"), Err(ParseError::UnsupportedSyntax(_))));
        assert_eq!(parse_rule("example.com##").unwrap_err(), ParseError::EmptySelector);
    }

    #[test]
    fn comments_and_blank_lines_are_not_rules() {
        assert_eq!(parse_rule("! Title: EasyList").unwrap_err(), ParseError::Comment);
        assert_eq!(parse_rule("[Adblock Plus 2.0]").unwrap_err(), ParseError::Comment);
        assert_eq!(parse_rule("# hosts comment").unwrap_err(), ParseError::Comment);
        assert_eq!(parse_rule("   ").unwrap_err(), ParseError::Empty);
        assert_eq!(parse_rule("@@").unwrap_err(), ParseError::EmptyPattern);
    }

    #[test]
    fn bad_lines_do_not_abort_the_list() {
        let list = "[Adblock Plus 2.0]\n! Title: Test\n||ads.example.com^\n||bad.example.com^$nonsense\n\n##.ad\n";
        let parsed = parse_filter_list(list);
        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].line_number, 4);
        assert_eq!(parsed.metadata.title.as_deref(), Some("Test"));
        assert_eq!(parsed.line_count, 6);
    }
}
