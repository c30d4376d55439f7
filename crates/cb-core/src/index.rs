//! Immutable per-profile match index.
//!
//! Network rules are split by kind (exception / block) and filed under
//! exactly one key:
//!
//! - `Host`: rules pinned to a hostname (`||ads.example.com^`), looked up by
//!   walking the request host's label suffixes
//! - `Token`: rules containing an alphanumeric run every matching URL must
//!   contain, looked up by the URL's tokens
//! - `Unindexed`: regex rules and patterns with no usable key, scanned in full
//!
//! Cosmetic rules are filed under each included domain, or in the generic
//! list when they have no include domains.
//!
//! An index is never mutated after [`IndexBuilder::build`]; a rule change
//! builds a new one.

use std::collections::HashMap;

use crate::hash::{BucketMap, Hash64, IndexHasher};
use crate::rule::{CosmeticRule, FilterRule};
use crate::types::RuleKind;

/// Where a network rule is filed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKey {
    Host(Hash64),
    Token(u32),
    Unindexed,
}

/// Buckets for one rule kind.
#[derive(Debug, Default)]
pub struct RuleBuckets {
    pub(crate) host: BucketMap<u64>,
    pub(crate) token: BucketMap<u32>,
    pub(crate) unindexed: Vec<u32>,
}

impl RuleBuckets {
    fn insert(&mut self, rule_id: u32, key: IndexKey) {
        match key {
            IndexKey::Host(hash) => self.host.entry(hash.to_u64()).or_default().push(rule_id),
            IndexKey::Token(token) => self.token.entry(token).or_default().push(rule_id),
            IndexKey::Unindexed => self.unindexed.push(rule_id),
        }
    }

    pub fn token_bucket_len(&self, token: u32) -> usize {
        self.token.get(&token).map_or(0, Vec::len)
    }

    pub fn unindexed_len(&self) -> usize {
        self.unindexed.len()
    }
}

/// Compiled lookup structure for one profile.
#[derive(Debug, Default)]
pub struct MatchIndex {
    pub(crate) rules: Vec<FilterRule>,
    pub(crate) exceptions: RuleBuckets,
    pub(crate) blocks: RuleBuckets,
    pub(crate) cosmetic: Vec<CosmeticRule>,
    pub(crate) generic_cosmetic: Vec<u32>,
    pub(crate) cosmetic_by_domain: HashMap<String, Vec<u32>, IndexHasher>,
}

impl MatchIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn network_rules(&self) -> &[FilterRule] {
        &self.rules
    }

    pub fn cosmetic_rules(&self) -> &[CosmeticRule] {
        &self.cosmetic
    }

    pub fn network_rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn cosmetic_rule_count(&self) -> usize {
        self.cosmetic.len()
    }

    pub fn exception_count(&self) -> usize {
        self.rules.iter().filter(|r| r.is_exception()).count()
    }

    /// Rules that every lookup has to scan.
    pub fn unindexed_count(&self) -> usize {
        self.exceptions.unindexed_len() + self.blocks.unindexed_len()
    }

    pub fn buckets(&self, kind: RuleKind) -> &RuleBuckets {
        match kind {
            RuleKind::Exception => &self.exceptions,
            RuleKind::Block => &self.blocks,
        }
    }
}

/// Assembles a [`MatchIndex`]. Key selection is the caller's business.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    index: MatchIndex,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(network: usize, cosmetic: usize) -> Self {
        let mut builder = Self::default();
        builder.index.rules.reserve(network);
        builder.index.cosmetic.reserve(cosmetic);
        builder
    }

    /// Current size of the token bucket a rule of `kind` would join.
    pub fn token_bucket_len(&self, kind: RuleKind, token: u32) -> usize {
        self.index.buckets(kind).token_bucket_len(token)
    }

    pub fn push_network(&mut self, rule: FilterRule, key: IndexKey) {
        let rule_id = self.index.rules.len() as u32;
        match rule.kind {
            RuleKind::Exception => self.index.exceptions.insert(rule_id, key),
            RuleKind::Block => self.index.blocks.insert(rule_id, key),
        }
        self.index.rules.push(rule);
    }

    pub fn push_cosmetic(&mut self, rule: CosmeticRule) {
        let rule_id = self.index.cosmetic.len() as u32;
        if rule.domains.is_generic() {
            self.index.generic_cosmetic.push(rule_id);
        } else {
            for domain in &rule.domains.include {
                self.index
                    .cosmetic_by_domain
                    .entry(domain.clone())
                    .or_default()
                    .push(rule_id);
            }
        }
        self.index.cosmetic.push(rule);
    }

    pub fn build(self) -> MatchIndex {
        self.index
    }
}
