//! ContentBlocker Engine
//!
//! Ties compiled filter lists together into a running blocker:
//!
//! - `profile`: one filter list with its metadata and compiled index
//! - `store`: the set of profiles, published as atomic snapshots
//! - `manager`: request evaluation and cosmetic selector aggregation
//! - `updater`: fetch, checksum validation and atomic replacement of lists
//! - `storage`: profiles on disk
//! - `config`: engine settings

pub mod config;
pub mod error;
pub mod manager;
pub mod profile;
pub mod storage;
pub mod store;
pub mod updater;

pub use config::EngineConfig;
pub use error::{EngineError, FetchError, Result};
pub use manager::ContentBlockingManager;
pub use profile::{Profile, ProfileCategory, ProfileMetadata, ProfileSource, ProfileSummary, CUSTOM_PROFILE_ID};
pub use storage::ProfileStorage;
pub use store::{ProfileStore, StoreSnapshot};
pub use updater::{FilterListFetcher, HttpFetcher, UpdateReport, UpdateState, Updater};
