//! ContentBlocker Core Library
//!
//! This crate provides the core matching engine for the ContentBlocker
//! filter-list engine.
//!
//! # Architecture
//!
//! Each filter list compiles into an immutable [`MatchIndex`]: host buckets,
//! token buckets and a short unindexed tail for network rules, plus
//! domain-keyed cosmetic rules. Patterns are compiled once at load time. The
//! hot path only reads, so an index can be shared between threads freely.
//!
//! # Modules
//!
//! - `cache`: small LRU cache
//! - `hash`: Murmur3 hash functions for domain and token hashing
//! - `psl`: Public Suffix List for eTLD+1 extraction
//! - `url`: Fast URL helpers without a full parser
//! - `pattern`: Compiled wildcard and regex patterns
//! - `rule`: Typed network and cosmetic rules
//! - `index`: Per-profile match index
//! - `matcher`: Single-index request matching
//! - `types`: Shared type definitions

pub mod cache;
pub mod hash;
pub mod index;
pub mod matcher;
pub mod pattern;
pub mod psl;
pub mod rule;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use hash::{hash_domain, hash_token, Hash64};
pub use index::{IndexBuilder, IndexKey, MatchIndex};
pub use matcher::{CosmeticMatch, Matcher};
pub use pattern::{CompiledPattern, PatternError};
pub use psl::{get_etld1, is_third_party};
pub use rule::{CosmeticRule, DomainScope, FilterRule, RuleEntry};
pub use types::{
    MatchDecision, MatchedRule, Request, RequestContext, RequestType, RuleFlags, RuleKind, ThirdPartyConstraint,
};
