//! Index builder: files each parsed rule under its lookup key.

use std::cmp::Reverse;

use cb_core::hash::{hash_domain, hash_token};
use cb_core::index::{IndexBuilder, IndexKey, MatchIndex};
use cb_core::pattern::CompiledPattern;
use cb_core::rule::{FilterRule, RuleEntry};

use crate::metadata::ListMetadata;
use crate::optimizer::{optimize_entries, OptimizeStats};
use crate::parser::{parse_filter_list, LineError};

/// A list compiled all the way to its match index.
#[derive(Debug)]
pub struct CompiledList {
    pub index: MatchIndex,
    pub metadata: ListMetadata,
    pub errors: Vec<LineError>,
    pub stats: CompileStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileStats {
    pub lines: usize,
    pub network_rules: usize,
    pub cosmetic_rules: usize,
    pub rejected: usize,
    pub deduped: usize,
    pub unindexed: usize,
}

/// Parse, deduplicate and index a filter list.
pub fn compile_filter_list(text: &str) -> CompiledList {
    let mut parsed = parse_filter_list(text);
    let OptimizeStats { deduped, .. } = optimize_entries(&mut parsed.entries);
    let index = build_index(parsed.entries);

    let stats = CompileStats {
        lines: parsed.line_count,
        network_rules: index.network_rule_count(),
        cosmetic_rules: index.cosmetic_rule_count(),
        rejected: parsed.errors.len(),
        deduped,
        unindexed: index.unindexed_count(),
    };
    log::debug!(
        "Compiled {} lines into {} network and {} cosmetic rules ({} rejected, {} duplicates, {} unindexed)",
        stats.lines,
        stats.network_rules,
        stats.cosmetic_rules,
        stats.rejected,
        stats.deduped,
        stats.unindexed
    );

    CompiledList {
        index,
        metadata: parsed.metadata,
        errors: parsed.errors,
        stats,
    }
}

/// Build an immutable index from parsed entries, preserving their order.
pub fn build_index(entries: Vec<RuleEntry>) -> MatchIndex {
    let network = entries.iter().filter(|e| matches!(e, RuleEntry::Network(_))).count();
    let mut builder = IndexBuilder::with_capacity(network, entries.len() - network);

    for entry in entries {
        match entry {
            RuleEntry::Network(rule) => {
                let key = select_key(&rule, &builder);
                builder.push_network(rule, key);
            }
            RuleEntry::Cosmetic(rule) => builder.push_cosmetic(rule),
        }
    }

    builder.build()
}

/// Pick the narrowest key for a rule.
///
/// A pinned host wins. Otherwise the rule joins the currently smallest
/// bucket among its safe tokens, preferring longer tokens on ties since
/// they are rarer in URLs.
fn select_key(rule: &FilterRule, builder: &IndexBuilder) -> IndexKey {
    let pattern = match &rule.pattern {
        CompiledPattern::Wildcard(pattern) => pattern,
        CompiledPattern::Regex(_) => return IndexKey::Unindexed,
    };

    if let Some(host) = pattern.anchored_host() {
        return IndexKey::Host(hash_domain(host));
    }

    pattern
        .index_tokens()
        .into_iter()
        .map(|token| {
            let hash = hash_token(token.to_ascii_lowercase().as_bytes());
            (hash, token.len())
        })
        .min_by_key(|&(hash, len)| (builder.token_bucket_len(rule.kind, hash), Reverse(len)))
        .map_or(IndexKey::Unindexed, |(hash, _)| IndexKey::Token(hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_rule;
    use cb_core::matcher::Matcher;
    use cb_core::types::{Request, RequestContext, RequestType, RuleKind};

    fn network(line: &str) -> FilterRule {
        match parse_rule(line) {
            Ok(RuleEntry::Network(rule)) => rule,
            other => panic!("expected network rule for {line}, got {other:?}"),
        }
    }

    #[test]
    fn key_selection() {
        let builder = IndexBuilder::new();
        assert_eq!(
            select_key(&network("||ads.example.com^$script"), &builder),
            IndexKey::Host(hash_domain("ads.example.com"))
        );
        assert_eq!(
            select_key(&network("||Ads.Example.com/path"), &builder),
            IndexKey::Host(hash_domain("ads.example.com"))
        );
        assert_eq!(
            select_key(&network("/banner/*.png"), &builder),
            IndexKey::Token(hash_token(b"banner"))
        );
        assert_eq!(select_key(&network(r"/track\d+/"), &builder), IndexKey::Unindexed);
        assert_eq!(select_key(&network("ad"), &builder), IndexKey::Unindexed);
        assert_eq!(select_key(&network("*"), &builder), IndexKey::Unindexed);
    }

    #[test]
    fn prefers_smaller_token_buckets() {
        let mut builder = IndexBuilder::new();
        let first = network("/ads/banner/*");
        assert_eq!(select_key(&first, &builder), IndexKey::Token(hash_token(b"banner")));
        builder.push_network(first, IndexKey::Token(hash_token(b"banner")));

        // "banner" is now crowded, so the shorter "ads" wins
        let second = network("/ads/banner/*.gif");
        assert_eq!(select_key(&second, &builder), IndexKey::Token(hash_token(b"ads")));
        assert_eq!(builder.token_bucket_len(RuleKind::Block, hash_token(b"banner")), 1);
    }

    #[test]
    fn exception_beats_block_within_one_list() {
        let entries = ["||ads.example.com^$script", "@@||ads.example.com/allow.js$script"]
            .iter()
            .map(|line| parse_rule(line).unwrap())
            .collect();
        let index = build_index(entries);
        let matcher = Matcher::new(&index);

        let allowed = Request::new("https://ads.example.com/allow.js", "https://site.com/", RequestType::SCRIPT);
        let ctx = RequestContext::from_request(&allowed);
        assert_eq!(
            matcher.find_exception(&ctx).map(|r| r.raw.as_str()),
            Some("@@||ads.example.com/allow.js$script")
        );

        let blocked = Request::new("https://ads.example.com/other.js", "https://site.com/", RequestType::SCRIPT);
        let ctx = RequestContext::from_request(&blocked);
        assert!(matcher.find_exception(&ctx).is_none());
        assert_eq!(matcher.find_block(&ctx).map(|r| r.raw.as_str()), Some("||ads.example.com^$script"));

        let image = Request::new("https://ads.example.com/other.png", "https://site.com/", RequestType::IMAGE);
        let ctx = RequestContext::from_request(&image);
        assert!(matcher.find_block(&ctx).is_none());
    }

    #[test]
    fn compile_reports_stats() {
        let list = "[Adblock Plus 2.0]\n! Title: Test\n||ads.example.com^\n||ads.example.com^\n/ad[0-9]+/\n##.ad\nbad$option\n";
        let compiled = compile_filter_list(list);
        assert_eq!(compiled.stats.network_rules, 2);
        assert_eq!(compiled.stats.cosmetic_rules, 1);
        assert_eq!(compiled.stats.deduped, 1);
        assert_eq!(compiled.stats.rejected, 1);
        assert_eq!(compiled.stats.unindexed, 1);
        assert_eq!(compiled.metadata.title.as_deref(), Some("Test"));
    }
}
