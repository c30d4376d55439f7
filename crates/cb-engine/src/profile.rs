//! Profiles: one filter list each, with its compiled index.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use cb_compiler::{build_index, optimize_entries, parse_filter_list, LineError, ListMetadata};
use cb_core::index::MatchIndex;
use cb_core::rule::{CosmeticRule, FilterRule, RuleEntry};
use cb_core::types::RuleFlags;

/// Identifier of the always-present Custom Rules profile.
pub const CUSTOM_PROFILE_ID: &str = "custom";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileCategory {
    Advertisements,
    Annoyance,
    Privacy,
    Social,
    Regional,
    #[default]
    Other,
}

impl ProfileCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Advertisements => "advertisements",
            Self::Annoyance => "annoyance",
            Self::Privacy => "privacy",
            Self::Social => "social",
            Self::Regional => "regional",
            Self::Other => "other",
        }
    }
}

/// Everything about a profile except its rules. Persisted in `profiles.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub identifier: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: ProfileCategory,
    #[serde(default)]
    pub update_url: Option<String>,
    /// Days between updates, 0 = never
    #[serde(default)]
    pub update_interval_days: u32,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    /// Checksum directive found in the list text
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl ProfileMetadata {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            title: String::new(),
            category: ProfileCategory::Other,
            update_url: None,
            update_interval_days: 0,
            last_update: None,
            checksum: None,
            enabled: true,
        }
    }
}

/// Input for [`crate::ProfileStore::add_profile`].
#[derive(Debug, Clone)]
pub struct ProfileSource {
    pub metadata: ProfileMetadata,
    /// Raw filter list text
    pub text: String,
}

/// Row of [`crate::ProfileStore::list_profiles`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSummary {
    pub identifier: String,
    pub title: String,
    pub category: ProfileCategory,
    pub enabled: bool,
    pub update_url: Option<String>,
    pub update_interval_days: u32,
    pub last_update: Option<DateTime<Utc>>,
    pub network_rules: usize,
    pub exception_rules: usize,
    pub cosmetic_rules: usize,
    pub parse_errors: usize,
}

/// A compiled filter list. Immutable: every change produces a new value.
#[derive(Debug, Clone)]
pub struct Profile {
    metadata: ProfileMetadata,
    lines: Arc<Vec<String>>,
    index: Arc<MatchIndex>,
    list_metadata: Arc<ListMetadata>,
    parse_errors: Arc<Vec<LineError>>,
    revision: u64,
}

impl Profile {
    /// Compile `text` into a profile. Bad lines are skipped and kept in
    /// [`Profile::parse_errors`].
    pub fn from_text(metadata: ProfileMetadata, text: &str) -> Self {
        let lines = text.lines().map(|line| line.trim_end().to_string()).collect();
        Self::from_lines(metadata, lines)
    }

    /// An empty, enabled Custom Rules profile.
    pub fn custom() -> Self {
        Self::from_lines(custom_metadata(), Vec::new())
    }

    pub(crate) fn from_lines(mut metadata: ProfileMetadata, lines: Vec<String>) -> Self {
        let is_custom = metadata.identifier == CUSTOM_PROFILE_ID;
        let parsed = parse_filter_list(&lines.join("\n"));

        let mut entries = parsed.entries;
        let stats = optimize_entries(&mut entries);
        if is_custom {
            for entry in &mut entries {
                if let RuleEntry::Network(rule) = entry {
                    rule.flags |= RuleFlags::IS_USER_RULE;
                }
            }
        }
        let index = build_index(entries);

        if metadata.title.is_empty() {
            if let Some(title) = &parsed.metadata.title {
                metadata.title = title.clone();
            }
        }
        if parsed.metadata.checksum.is_some() {
            metadata.checksum = parsed.metadata.checksum.clone();
        }

        log::debug!(
            "Built profile '{}': {} network rules ({} exceptions), {} cosmetic rules, {} duplicates, {} rejected lines",
            metadata.identifier,
            index.network_rule_count(),
            index.exception_count(),
            index.cosmetic_rule_count(),
            stats.deduped,
            parsed.errors.len()
        );

        Self {
            metadata,
            lines: Arc::new(lines),
            index: Arc::new(index),
            list_metadata: Arc::new(parsed.metadata),
            parse_errors: Arc::new(parsed.errors),
            revision: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.metadata.identifier
    }

    pub fn metadata(&self) -> &ProfileMetadata {
        &self.metadata
    }

    pub fn is_enabled(&self) -> bool {
        self.metadata.enabled
    }

    pub fn is_custom(&self) -> bool {
        self.metadata.identifier == CUSTOM_PROFILE_ID
    }

    pub fn index(&self) -> &MatchIndex {
        &self.index
    }

    pub fn rules(&self) -> &[FilterRule] {
        self.index.network_rules()
    }

    pub fn cosmetic_rules(&self) -> &[CosmeticRule] {
        self.index.cosmetic_rules()
    }

    /// Source lines as stored, comments included.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn source_text(&self) -> String {
        let mut text = self.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }

    pub fn list_metadata(&self) -> &ListMetadata {
        &self.list_metadata
    }

    pub fn parse_errors(&self) -> &[LineError] {
        &self.parse_errors
    }

    /// Store revision at which this value was published.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether the external scheduler should refresh this profile at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.metadata.enabled || self.metadata.update_url.is_none() || self.metadata.update_interval_days == 0 {
            return false;
        }
        match self.metadata.last_update {
            None => true,
            Some(last) => last
                .checked_add_signed(Duration::days(i64::from(self.metadata.update_interval_days)))
                .is_some_and(|next| now >= next),
        }
    }

    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            identifier: self.metadata.identifier.clone(),
            title: self.metadata.title.clone(),
            category: self.metadata.category,
            enabled: self.metadata.enabled,
            update_url: self.metadata.update_url.clone(),
            update_interval_days: self.metadata.update_interval_days,
            last_update: self.metadata.last_update,
            network_rules: self.index.network_rule_count(),
            exception_rules: self.index.exception_count(),
            cosmetic_rules: self.index.cosmetic_rule_count(),
            parse_errors: self.parse_errors.len(),
        }
    }

    pub(crate) fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Same rules and index, different metadata.
    pub(crate) fn with_metadata(&self, metadata: ProfileMetadata) -> Self {
        Self {
            metadata,
            ..self.clone()
        }
    }
}

pub(crate) fn custom_metadata() -> ProfileMetadata {
    ProfileMetadata {
        title: "Custom Rules".to_string(),
        ..ProfileMetadata::new(CUSTOM_PROFILE_ID)
    }
}
