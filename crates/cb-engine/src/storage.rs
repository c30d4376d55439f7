//! On-disk profile storage.
//!
//! ```text
//! <data_dir>/profiles.json   metadata of every subscribed profile
//! <data_dir>/<id>.txt        raw rule text of each profile
//! <data_dir>/custom.txt      the Custom Rules profile
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::profile::{ProfileMetadata, ProfileSource, CUSTOM_PROFILE_ID};
use crate::store::ProfileStore;

const METADATA_FILE: &str = "profiles.json";

#[derive(Debug, Clone)]
pub struct ProfileStorage {
    root: PathBuf,
}

impl ProfileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn rules_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.txt"))
    }

    /// Rebuild a store from disk. A missing directory or file yields an
    /// empty store or an empty profile rather than an error.
    pub fn load_store(&self) -> Result<ProfileStore> {
        let custom_text = read_optional(&self.rules_path(CUSTOM_PROFILE_ID))?.unwrap_or_default();
        let store = ProfileStore::with_custom_rules(&custom_text);

        let metadata: Vec<ProfileMetadata> = match read_optional(&self.root.join(METADATA_FILE))? {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };

        for metadata in metadata {
            let path = self.rules_path(&metadata.identifier);
            let text = match read_optional(&path)? {
                Some(text) => text,
                None => {
                    log::warn!("Rule file {} is missing, loading profile '{}' empty", path.display(), metadata.identifier);
                    String::new()
                }
            };
            let id = metadata.identifier.clone();
            if let Err(err) = store.add_profile(ProfileSource { metadata, text }) {
                log::warn!("Skipping stored profile '{}': {}", id, err);
            }
        }

        log::info!("Loaded {} profiles from {}", store.snapshot().profiles().len(), self.root.display());
        Ok(store)
    }

    /// Write every profile's rules and the metadata file.
    pub fn persist(&self, store: &ProfileStore) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let snapshot = store.snapshot();

        let mut metadata = Vec::new();
        for profile in snapshot.profiles() {
            write_atomic(&self.rules_path(profile.id()), &profile.source_text())?;
            if !profile.is_custom() {
                metadata.push(profile.metadata().clone());
            }
        }

        let json = serde_json::to_string_pretty(&metadata)?;
        write_atomic(&self.root.join(METADATA_FILE), &json)?;
        Ok(())
    }

    /// Delete the rule file of a removed profile.
    pub fn remove_rules(&self, id: &str) -> Result<()> {
        match std::fs::remove_file(self.rules_path(id)) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileCategory;
    use chrono::{TimeZone, Utc};

    #[test]
    fn empty_directory_loads_empty_store() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("not-created-yet");
        let store = ProfileStorage::new(&dir).load_store().unwrap();
        assert_eq!(store.list_profiles().len(), 1);
        assert!(store.custom_profile().lines().is_empty());
    }

    #[test]
    fn persist_and_reload_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let storage = ProfileStorage::new(&dir);

        let store = ProfileStore::new();
        let metadata = ProfileMetadata {
            title: "EasyList".to_string(),
            category: ProfileCategory::Advertisements,
            update_url: Some("https://lists.example/easylist.txt".to_string()),
            update_interval_days: 4,
            last_update: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            ..ProfileMetadata::new("easylist")
        };
        store
            .add_profile(ProfileSource {
                metadata: metadata.clone(),
                text: "||ads.example.com^\n##.ad\n".to_string(),
            })
            .unwrap();
        store.add_custom_rule("||mine.example^").unwrap();
        store.set_enabled("easylist", false).unwrap();
        storage.persist(&store).unwrap();

        assert!(dir.join("profiles.json").exists());
        assert_eq!(std::fs::read_to_string(dir.join("custom.txt")).unwrap(), "||mine.example^\n");

        let loaded = storage.load_store().unwrap();
        let easylist = loaded.get("easylist").unwrap();
        assert_eq!(easylist.metadata(), &ProfileMetadata { enabled: false, ..metadata });
        assert_eq!(easylist.rules().len(), 1);
        assert_eq!(easylist.cosmetic_rules().len(), 1);
        assert_eq!(loaded.custom_profile().rules().len(), 1);
    }

    #[test]
    fn missing_rule_file_loads_empty_profile() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        std::fs::write(dir.join("profiles.json"), r#"[{"identifier": "gone", "title": "Gone"}]"#).unwrap();

        let store = ProfileStorage::new(&dir).load_store().unwrap();
        let gone = store.get("gone").unwrap();
        assert!(gone.is_enabled());
        assert!(gone.rules().is_empty());
    }

    #[test]
    fn remove_rules_tolerates_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = ProfileStorage::new(tmp.path());
        storage.remove_rules("nothing").unwrap();
    }
}
