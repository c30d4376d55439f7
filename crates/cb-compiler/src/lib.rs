//! ContentBlocker Filter List Compiler
//!
//! This crate turns Adblock Plus filter lists into [`cb_core::MatchIndex`]
//! values: it parses lines into typed rules, validates list checksums,
//! removes duplicate rules and picks an index key for every network rule.

pub mod builder;
pub mod checksum;
pub mod metadata;
pub mod optimizer;
pub mod parser;

pub use builder::{build_index, compile_filter_list, CompileStats, CompiledList};
pub use checksum::{compute_checksum, find_checksum, validate_checksum, ChecksumError, ChecksumStatus};
pub use metadata::ListMetadata;
pub use optimizer::{optimize_entries, OptimizeStats};
pub use parser::{parse_filter_list, parse_rule, LineError, ParseError, ParsedList};
