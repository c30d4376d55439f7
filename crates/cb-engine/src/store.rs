//! Profile store with copy-on-write snapshots.
//!
//! Readers grab the current [`StoreSnapshot`] with a single atomic load and
//! keep matching against it for as long as they hold it. Writers serialize on
//! a mutex, build the changed profile off to the side and publish a new
//! snapshot with one atomic store; only the changed profile is rebuilt.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use cb_compiler::{parse_rule, ParseError};

use crate::error::{EngineError, Result};
use crate::profile::{custom_metadata, Profile, ProfileSource, ProfileSummary, CUSTOM_PROFILE_ID};

/// Immutable view of every profile at one point in time.
#[derive(Debug, Default)]
pub struct StoreSnapshot {
    profiles: Vec<Arc<Profile>>,
    generation: u64,
}

impl StoreSnapshot {
    /// All profiles in display (insertion) order.
    pub fn profiles(&self) -> &[Arc<Profile>] {
        &self.profiles
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Arc<Profile>> {
        self.profiles.iter().filter(|p| p.is_enabled())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Profile>> {
        self.profiles.iter().find(|p| p.id() == id)
    }

    /// Bumped on every published change.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

pub struct ProfileStore {
    state: ArcSwap<StoreSnapshot>,
    writer: Mutex<()>,
}

impl Default for ProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileStore {
    /// A store holding only an empty Custom Rules profile.
    pub fn new() -> Self {
        Self::with_custom_profile(Profile::custom())
    }

    /// A store whose Custom Rules profile is compiled from `text`. Bad lines
    /// in a hand-edited custom file are skipped like in any other list.
    pub fn with_custom_rules(text: &str) -> Self {
        Self::with_custom_profile(Profile::from_text(custom_metadata(), text))
    }

    fn with_custom_profile(custom: Profile) -> Self {
        Self {
            state: ArcSwap::from_pointee(StoreSnapshot {
                profiles: vec![Arc::new(custom)],
                generation: 0,
            }),
            writer: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.state.load_full()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Profile>> {
        self.state.load().get(id).cloned()
    }

    pub fn custom_profile(&self) -> Arc<Profile> {
        match self.get(CUSTOM_PROFILE_ID) {
            Some(profile) => profile,
            None => Arc::new(Profile::custom()),
        }
    }

    pub fn list_profiles(&self) -> Vec<ProfileSummary> {
        self.state.load().profiles.iter().map(|p| p.summary()).collect()
    }

    /// Compile and append a new profile.
    pub fn add_profile(&self, source: ProfileSource) -> Result<ProfileSummary> {
        let id = source.metadata.identifier.clone();
        if !is_valid_identifier(&id) {
            return Err(EngineError::InvalidIdentifier(id));
        }
        if self.get(&id).is_some() {
            return Err(EngineError::DuplicateProfile(id));
        }

        let profile = Profile::from_text(source.metadata, &source.text);

        let _guard = self.lock_writer();
        let current = self.state.load_full();
        if current.get(&id).is_some() {
            return Err(EngineError::DuplicateProfile(id));
        }

        let mut profiles = current.profiles.clone();
        let generation = current.generation + 1;
        let published = Arc::new(profile.with_revision(generation));
        let summary = published.summary();
        profiles.push(published);
        self.publish(profiles, generation);

        log::info!("Added profile '{}' ({} rules)", id, summary.network_rules + summary.cosmetic_rules);
        Ok(summary)
    }

    pub fn remove_profile(&self, id: &str) -> Result<()> {
        if id == CUSTOM_PROFILE_ID {
            return Err(EngineError::ProtectedProfile(id.to_string()));
        }

        let _guard = self.lock_writer();
        let current = self.state.load_full();
        let pos = current
            .profiles
            .iter()
            .position(|p| p.id() == id)
            .ok_or_else(|| EngineError::ProfileNotFound(id.to_string()))?;

        let mut profiles = current.profiles.clone();
        profiles.remove(pos);
        self.publish(profiles, current.generation + 1);

        log::info!("Removed profile '{}'", id);
        Ok(())
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        self.modify(id, |profile| {
            if profile.is_enabled() == enabled {
                return Ok(None);
            }
            let mut metadata = profile.metadata().clone();
            metadata.enabled = enabled;
            Ok(Some(profile.with_metadata(metadata)))
        })?;
        log::info!("Profile '{}' {}", id, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Append custom rules, one per line. Every line is validated first; if
    /// any is malformed nothing is added and the error names that line.
    /// Returns how many new rules were added.
    pub fn add_custom_rule(&self, text: &str) -> Result<usize> {
        let mut new_lines = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            match parse_rule(line) {
                Ok(_) | Err(ParseError::Comment) => new_lines.push(line.to_string()),
                Err(ParseError::Empty) => {}
                Err(source) => {
                    return Err(EngineError::InvalidCustomRule {
                        line: idx + 1,
                        rule: line.to_string(),
                        source,
                    })
                }
            }
        }

        let mut added = 0;
        self.modify(CUSTOM_PROFILE_ID, |custom| {
            let mut lines = custom.lines().to_vec();
            for line in new_lines {
                if !lines.contains(&line) {
                    lines.push(line);
                    added += 1;
                }
            }
            if added == 0 {
                return Ok(None);
            }
            Ok(Some(Profile::from_lines(custom.metadata().clone(), lines)))
        })?;
        Ok(added)
    }

    /// Remove every line equal to one of the lines of `text`. Returns how
    /// many lines were removed.
    pub fn remove_custom_rule(&self, text: &str) -> Result<usize> {
        let targets: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

        let mut removed = 0;
        self.modify(CUSTOM_PROFILE_ID, |custom| {
            let before = custom.lines().len();
            let lines: Vec<String> = custom
                .lines()
                .iter()
                .filter(|line| !targets.contains(&line.trim()))
                .cloned()
                .collect();
            removed = before - lines.len();
            if removed == 0 {
                return Ok(None);
            }
            Ok(Some(Profile::from_lines(custom.metadata().clone(), lines)))
        })?;
        Ok(removed)
    }

    pub fn clear_custom_rules(&self) -> Result<()> {
        self.modify(CUSTOM_PROFILE_ID, |custom| {
            if custom.lines().is_empty() {
                return Ok(None);
            }
            Ok(Some(Profile::from_lines(custom.metadata().clone(), Vec::new())))
        })
    }

    /// Swap in a rebuilt profile, provided the one it was derived from is
    /// still current and enabled. `expected_revision` is the
    /// [`Profile::revision`] observed when the rebuild started.
    pub fn replace_profile(&self, id: &str, expected_revision: u64, replacement: Profile) -> Result<()> {
        let _guard = self.lock_writer();
        let current = self.state.load_full();
        let pos = match current.profiles.iter().position(|p| p.id() == id) {
            Some(pos) => pos,
            None => return Err(EngineError::UpdateDiscarded(id.to_string())),
        };
        let existing = &current.profiles[pos];
        if existing.revision() != expected_revision || !existing.is_enabled() {
            return Err(EngineError::UpdateDiscarded(id.to_string()));
        }

        let generation = current.generation + 1;
        let mut profiles = current.profiles.clone();
        profiles[pos] = Arc::new(replacement.with_revision(generation));
        self.publish(profiles, generation);
        Ok(())
    }

    /// Identifiers of enabled profiles whose update interval has elapsed.
    pub fn due_for_update(&self, now: DateTime<Utc>) -> Vec<String> {
        self.state
            .load()
            .profiles
            .iter()
            .filter(|p| p.is_due(now))
            .map(|p| p.id().to_string())
            .collect()
    }

    /// Rebuild one profile under the writer lock. `change` returns `None`
    /// when there is nothing to do.
    fn modify<F>(&self, id: &str, change: F) -> Result<()>
    where
        F: FnOnce(&Profile) -> Result<Option<Profile>>,
    {
        let _guard = self.lock_writer();
        let current = self.state.load_full();
        let pos = current
            .profiles
            .iter()
            .position(|p| p.id() == id)
            .ok_or_else(|| EngineError::ProfileNotFound(id.to_string()))?;

        let Some(changed) = change(&current.profiles[pos])? else {
            return Ok(());
        };

        let generation = current.generation + 1;
        let mut profiles = current.profiles.clone();
        profiles[pos] = Arc::new(changed.with_revision(generation));
        self.publish(profiles, generation);
        Ok(())
    }

    fn publish(&self, profiles: Vec<Arc<Profile>>, generation: u64) {
        self.state.store(Arc::new(StoreSnapshot { profiles, generation }));
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Identifiers double as file names on disk.
fn is_valid_identifier(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileMetadata;
    use chrono::TimeZone;

    fn source(id: &str, text: &str) -> ProfileSource {
        ProfileSource {
            metadata: ProfileMetadata::new(id),
            text: text.to_string(),
        }
    }

    #[test]
    fn custom_profile_always_exists() {
        let store = ProfileStore::new();
        let profiles = store.list_profiles();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].identifier, CUSTOM_PROFILE_ID);
        assert_eq!(profiles[0].title, "Custom Rules");

        assert!(matches!(
            store.remove_profile(CUSTOM_PROFILE_ID),
            Err(EngineError::ProtectedProfile(_))
        ));
        assert_eq!(store.list_profiles().len(), 1);
    }

    #[test]
    fn add_remove_and_order() {
        let store = ProfileStore::new();
        store.add_profile(source("easylist", "||ads.example.com^")).unwrap();
        store.add_profile(source("privacy", "||tracker.example^")).unwrap();

        let ids: Vec<String> = store.list_profiles().into_iter().map(|p| p.identifier).collect();
        assert_eq!(ids, vec!["custom", "easylist", "privacy"]);

        assert!(matches!(
            store.add_profile(source("easylist", "")),
            Err(EngineError::DuplicateProfile(_))
        ));
        assert!(matches!(
            store.add_profile(source("custom", "")),
            Err(EngineError::DuplicateProfile(_))
        ));
        assert!(matches!(
            store.add_profile(source("../etc", "")),
            Err(EngineError::InvalidIdentifier(_))
        ));

        store.remove_profile("easylist").unwrap();
        assert!(matches!(store.remove_profile("easylist"), Err(EngineError::ProfileNotFound(_))));
        assert_eq!(store.list_profiles().len(), 2);
    }

    #[test]
    fn set_enabled_keeps_index() {
        let store = ProfileStore::new();
        store.add_profile(source("easylist", "||ads.example.com^")).unwrap();
        let before = store.get("easylist").unwrap();

        store.set_enabled("easylist", false).unwrap();
        let after = store.get("easylist").unwrap();
        assert!(!after.is_enabled());
        assert_eq!(after.rules().len(), 1);
        assert!(after.revision() > before.revision());
        assert_eq!(store.snapshot().enabled().count(), 1);

        assert!(matches!(store.set_enabled("missing", true), Err(EngineError::ProfileNotFound(_))));
    }

    #[test]
    fn custom_rules_add_and_remove() {
        let store = ProfileStore::new();
        assert_eq!(store.add_custom_rule("||ads.example.com^\n##.banner").unwrap(), 2);
        assert_eq!(store.add_custom_rule("||ads.example.com^").unwrap(), 0);
        assert_eq!(store.custom_profile().rules().len(), 1);
        assert_eq!(store.custom_profile().cosmetic_rules().len(), 1);

        assert_eq!(store.remove_custom_rule("##.banner").unwrap(), 1);
        assert_eq!(store.remove_custom_rule("##.banner").unwrap(), 0);
        assert_eq!(store.custom_profile().cosmetic_rules().len(), 0);

        store.clear_custom_rules().unwrap();
        assert!(store.custom_profile().lines().is_empty());
    }

    #[test]
    fn malformed_custom_rule_names_the_line() {
        let store = ProfileStore::new();
        store.add_custom_rule("||keep.example^").unwrap();

        let err = store
            .add_custom_rule("||ok.example^\n||bad.example^$bogus")
            .unwrap_err();
        match err {
            EngineError::InvalidCustomRule { line, rule, .. } => {
                assert_eq!(line, 2);
                assert_eq!(rule, "||bad.example^$bogus");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(store.custom_profile().lines(), ["||keep.example^".to_string()]);
    }

    #[test]
    fn mutation_rebuilds_only_the_affected_profile() {
        let store = ProfileStore::new();
        store.add_profile(source("easylist", "||ads.example.com^")).unwrap();
        let easylist = store.get("easylist").unwrap();

        store.add_custom_rule("||other.example^").unwrap();
        assert!(Arc::ptr_eq(&easylist, &store.get("easylist").unwrap()));
    }

    #[test]
    fn replace_requires_current_revision() {
        let store = ProfileStore::new();
        store.add_profile(source("easylist", "||old.example^")).unwrap();
        let revision = store.get("easylist").unwrap().revision();

        let rebuilt = Profile::from_text(ProfileMetadata::new("easylist"), "||new.example^");
        store.set_enabled("easylist", false).unwrap();
        assert!(matches!(
            store.replace_profile("easylist", revision, rebuilt.clone()),
            Err(EngineError::UpdateDiscarded(_))
        ));
        assert_eq!(store.get("easylist").unwrap().rules()[0].raw, "||old.example^");

        store.set_enabled("easylist", true).unwrap();
        let revision = store.get("easylist").unwrap().revision();
        store.replace_profile("easylist", revision, rebuilt).unwrap();
        assert_eq!(store.get("easylist").unwrap().rules()[0].raw, "||new.example^");
    }

    #[test]
    fn snapshots_are_stable_across_writes() {
        let store = ProfileStore::new();
        let snapshot = store.snapshot();
        store.add_profile(source("easylist", "||ads.example.com^")).unwrap();
        assert_eq!(snapshot.profiles().len(), 1);
        assert_eq!(store.snapshot().profiles().len(), 2);
        assert!(store.snapshot().generation() > snapshot.generation());
    }

    #[test]
    fn due_profiles() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let store = ProfileStore::new();
        let mut metadata = ProfileMetadata::new("easylist");
        metadata.update_url = Some("https://lists.example/easylist.txt".to_string());
        metadata.update_interval_days = 1;
        store
            .add_profile(ProfileSource {
                metadata,
                text: String::new(),
            })
            .unwrap();
        store.add_profile(source("local", "")).unwrap();

        assert_eq!(store.due_for_update(now), vec!["easylist"]);
    }
}
