//! Core Matching Engine
//!
//! This is the hot path - every request goes through here. A `Matcher` is a
//! borrowed view over one immutable [`MatchIndex`]; it never mutates
//! anything, so any number of threads can match against the same index.

use crate::hash::hash_domain;
use crate::index::{MatchIndex, RuleBuckets};
use crate::psl::{get_etld1, walk_host_suffixes};
use crate::rule::FilterRule;
use crate::types::{Request, RequestContext};
use crate::url::{host_of, tokenize_url};

// =============================================================================
// Request Context
// =============================================================================

impl<'a> RequestContext<'a> {
    /// Derive everything the matcher needs from a browser request.
    ///
    /// A request without a document URL (a top-level navigation) is treated
    /// as first-party to itself.
    pub fn from_request(request: &'a Request) -> Self {
        let url_lower = request.url.to_ascii_lowercase();
        let req_host = host_of(&request.url);
        let mut site_host = host_of(&request.document_url);
        if site_host.is_empty() {
            site_host = req_host.clone();
        }

        let req_etld1 = get_etld1(&req_host);
        let site_etld1 = get_etld1(&site_host);
        let is_third_party = req_etld1 != site_etld1;
        let tokens = tokenize_url(&url_lower);

        Self {
            url: &request.url,
            url_lower,
            req_host,
            req_etld1,
            site_host,
            site_etld1,
            is_third_party,
            request_type: request.resource_type,
            tokens,
        }
    }
}

// =============================================================================
// Matcher
// =============================================================================

/// Selectors contributed by one index for a document.
#[derive(Debug, Default)]
pub struct CosmeticMatch<'a> {
    /// Hiding selectors whose scope covers the document
    pub selectors: Vec<&'a str>,
    /// `#@#` exceptions whose scope covers the document
    pub exceptions: Vec<&'a str>,
}

/// Matching engine over a single index.
pub struct Matcher<'a> {
    index: &'a MatchIndex,
}

impl<'a> Matcher<'a> {
    pub fn new(index: &'a MatchIndex) -> Self {
        Self { index }
    }

    /// First exception rule matching the request, if any.
    pub fn find_exception(&self, ctx: &RequestContext<'_>) -> Option<&'a FilterRule> {
        let index: &'a MatchIndex = self.index;
        self.find_in(&index.exceptions, ctx)
    }

    /// First block rule matching the request, if any.
    pub fn find_block(&self, ctx: &RequestContext<'_>) -> Option<&'a FilterRule> {
        let index: &'a MatchIndex = self.index;
        self.find_in(&index.blocks, ctx)
    }

    fn find_in(&self, buckets: &'a RuleBuckets, ctx: &RequestContext<'_>) -> Option<&'a FilterRule> {
        // Step 1: host-pinned rules, most specific suffix first
        if !buckets.host.is_empty() {
            for suffix in walk_host_suffixes(&ctx.req_host) {
                if let Some(ids) = buckets.host.get(&hash_domain(suffix).to_u64()) {
                    if let Some(rule) = self.first_match(ids, ctx) {
                        return Some(rule);
                    }
                }
            }
        }

        // Step 2: token-indexed rules
        if !buckets.token.is_empty() {
            for token in &ctx.tokens {
                if let Some(ids) = buckets.token.get(token) {
                    if let Some(rule) = self.first_match(ids, ctx) {
                        return Some(rule);
                    }
                }
            }
        }

        // Step 3: everything else
        self.first_match(&buckets.unindexed, ctx)
    }

    #[inline]
    fn first_match(&self, ids: &[u32], ctx: &RequestContext<'_>) -> Option<&'a FilterRule> {
        let rules: &'a [FilterRule] = &self.index.rules;
        ids.iter()
            .filter_map(|&id| rules.get(id as usize))
            .find(|rule| rule.matches(ctx))
    }

    /// Cosmetic selectors and exceptions applying to `document_host`.
    pub fn match_cosmetics(&self, document_host: &str) -> CosmeticMatch<'a> {
        let index: &'a MatchIndex = self.index;
        let mut result = CosmeticMatch::default();
        let rules = &index.cosmetic;

        let mut push = |id: u32| {
            if let Some(rule) = rules.get(id as usize) {
                if !rule.applies_to(document_host) {
                    return;
                }
                if rule.is_exception {
                    result.exceptions.push(rule.selector.as_str());
                } else {
                    result.selectors.push(rule.selector.as_str());
                }
            }
        };

        for &id in &index.generic_cosmetic {
            push(id);
        }

        for suffix in walk_host_suffixes(document_host) {
            if let Some(ids) = index.cosmetic_by_domain.get(suffix) {
                for &id in ids {
                    push(id);
                }
            }
        }

        result
    }
}
