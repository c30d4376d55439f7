//! Typed filter rules.
//!
//! A filter-list line parses into a [`RuleEntry`]: either a network rule
//! that blocks or excepts requests, or a cosmetic rule that hides elements.

use crate::pattern::CompiledPattern;
use crate::psl::is_subdomain_or_equal;
use crate::types::{RequestContext, RequestType, RuleFlags, RuleKind, ThirdPartyConstraint};

// =============================================================================
// Domain Scope
// =============================================================================

/// Include/exclude domain sets (`domain=a.com|~b.a.com`, `a.com,~b.a.com##`).
///
/// Entries match a host equal to them or any subdomain of them. When both an
/// include and an exclude entry match, the more specific (longer) one wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DomainScope {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl DomainScope {
    /// No restriction at all.
    pub fn is_unrestricted(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Applies to every domain unless excluded.
    pub fn is_generic(&self) -> bool {
        self.include.is_empty()
    }

    pub fn matches(&self, host: &str) -> bool {
        if self.is_unrestricted() {
            return true;
        }

        let best_include = longest_match(&self.include, host);
        let best_exclude = longest_match(&self.exclude, host);

        match (best_include, best_exclude) {
            (Some(inc), Some(exc)) => inc > exc,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => self.include.is_empty(),
        }
    }
}

fn longest_match(domains: &[String], host: &str) -> Option<usize> {
    domains
        .iter()
        .filter(|d| is_subdomain_or_equal(host, d))
        .map(|d| d.len())
        .max()
}

// =============================================================================
// Network Rule
// =============================================================================

/// A blocking or exception rule for network requests.
#[derive(Debug, Clone)]
pub struct FilterRule {
    /// Raw rule text, exactly as it appeared in the list
    pub raw: String,
    pub kind: RuleKind,
    pub pattern: CompiledPattern,
    pub domains: DomainScope,
    pub type_mask: RequestType,
    pub third_party: ThirdPartyConstraint,
    pub flags: RuleFlags,
}

impl FilterRule {
    pub fn is_exception(&self) -> bool {
        self.kind == RuleKind::Exception
    }

    pub fn is_regex(&self) -> bool {
        self.flags.contains(RuleFlags::IS_REGEX)
    }

    pub fn match_case(&self) -> bool {
        self.flags.contains(RuleFlags::MATCH_CASE)
    }

    /// Option checks: type, party, document domain. Cheap, so they run
    /// before the pattern.
    #[inline]
    pub fn options_match(&self, ctx: &RequestContext<'_>) -> bool {
        self.type_mask.intersects(ctx.request_type)
            && self.third_party.allows(ctx.is_third_party)
            && self.domains.matches(&ctx.site_host)
    }

    #[inline]
    pub fn matches(&self, ctx: &RequestContext<'_>) -> bool {
        self.options_match(ctx)
            && self.pattern.matches(ctx.url, &ctx.url_lower, self.match_case())
    }
}

// =============================================================================
// Cosmetic Rule
// =============================================================================

/// Element hiding rule (`domains##selector`) or its exception (`#@#`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CosmeticRule {
    pub raw: String,
    pub domains: DomainScope,
    pub selector: String,
    pub is_exception: bool,
}

impl CosmeticRule {
    pub fn applies_to(&self, document_host: &str) -> bool {
        self.domains.matches(document_host)
    }
}

// =============================================================================
// Rule Entry
// =============================================================================

/// One parsed filter-list line.
#[derive(Debug, Clone)]
pub enum RuleEntry {
    Network(FilterRule),
    Cosmetic(CosmeticRule),
}

impl RuleEntry {
    pub fn raw(&self) -> &str {
        match self {
            Self::Network(rule) => &rule.raw,
            Self::Cosmetic(rule) => &rule.raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(include: &[&str], exclude: &[&str]) -> DomainScope {
        DomainScope {
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn include_scope() {
        let s = scope(&["example.com"], &[]);
        assert!(s.matches("example.com"));
        assert!(s.matches("www.example.com"));
        assert!(!s.matches("other.com"));
    }

    #[test]
    fn exclude_scope() {
        let s = scope(&[], &["example.com"]);
        assert!(!s.matches("example.com"));
        assert!(!s.matches("news.example.com"));
        assert!(s.matches("other.com"));
    }

    #[test]
    fn most_specific_entry_wins() {
        let s = scope(&["example.com"], &["shop.example.com"]);
        assert!(s.matches("news.example.com"));
        assert!(!s.matches("shop.example.com"));

        let s = scope(&["shop.example.com"], &["example.com"]);
        assert!(s.matches("shop.example.com"));
        assert!(!s.matches("news.example.com"));
    }

    #[test]
    fn empty_scope_is_generic() {
        let s = DomainScope::default();
        assert!(s.is_unrestricted());
        assert!(s.is_generic());
        assert!(s.matches("anything.net"));
        assert!(s.matches(""));
    }
}
