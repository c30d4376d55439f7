use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding `profiles.json`, the profile rule files and `custom.txt`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Optional `public_suffix_list.dat` used for eTLD+1 lookups
    #[serde(default)]
    pub public_suffix_list: Option<PathBuf>,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Domains whose cosmetic selector sets are kept between profile changes
    #[serde(default = "default_cosmetic_cache_capacity")]
    pub cosmetic_cache_capacity: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("contentblocker")
}
fn default_fetch_timeout_secs() -> u64 {
    120
}
fn default_connect_timeout_secs() -> u64 {
    30
}
fn default_cosmetic_cache_capacity() -> usize {
    256
}
fn default_user_agent() -> String {
    format!("contentblocker/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            public_suffix_list: None,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            cosmetic_cache_capacity: default_cosmetic_cache_capacity(),
            user_agent: default_user_agent(),
        }
    }
}

impl EngineConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Load the configured public suffix list, if any. Returns whether one
    /// was loaded.
    pub fn init_public_suffix_list(&self) -> Result<bool> {
        let Some(path) = &self.public_suffix_list else {
            return Ok(false);
        };
        let text = std::fs::read_to_string(path)?;
        cb_core::psl::init_psl(&text)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.fetch_timeout_secs, 120);
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.cosmetic_cache_capacity, 256);
        assert!(config.public_suffix_list.is_none());

        let from_empty: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(from_empty, config);
    }

    #[test]
    fn test_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let path = dir.join("engine.json");

        let config = EngineConfig {
            fetch_timeout_secs: 5,
            data_dir: dir.join("data"),
            ..EngineConfig::default()
        };
        config.save_to_file(&path).unwrap();
        assert_eq!(EngineConfig::load_from_file(&path).unwrap(), config);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"cosmetic_cache_capacity": 8}"#).unwrap();
        assert_eq!(config.cosmetic_cache_capacity, 8);
        assert_eq!(config.fetch_timeout_secs, 120);
    }
}
