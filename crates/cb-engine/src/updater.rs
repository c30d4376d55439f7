//! Filter list updater.
//!
//! One update runs `Idle -> Fetching -> Validating -> Applying -> Idle`, or
//! ends in `Failed`. A failed update never touches the live profile. The
//! replacement is compiled off the store lock and published with one swap;
//! if the profile was removed, disabled or otherwise changed while the
//! download was in flight, the result is discarded. Dropping an update
//! future part way leaves the profile in `Failed` so it can be retried.
//!
//! Updates must run on a Tokio runtime: the list is compiled on the blocking
//! pool.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use cb_compiler::{validate_checksum, ChecksumStatus};

use crate::config::EngineConfig;
use crate::error::{EngineError, FetchError, Result};
use crate::profile::{Profile, ProfileSummary};
use crate::store::ProfileStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Fetching,
    Validating,
    Applying,
    /// Last attempt failed; holds the reason until the next attempt
    Failed(String),
}

impl UpdateState {
    fn is_running(&self) -> bool {
        matches!(self, Self::Fetching | Self::Validating | Self::Applying)
    }
}

/// Network collaborator: GET `url`, return the body as text.
pub trait FilterListFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = std::result::Result<String, FetchError>> + Send;
}

/// [`FilterListFetcher`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

impl FilterListFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Tracks one run in the state map. A run that is dropped before
/// [`UpdateRun::finish`] is marked as cancelled.
struct UpdateRun<'a> {
    states: &'a Mutex<HashMap<String, UpdateState>>,
    id: &'a str,
    finished: bool,
}

impl<'a> UpdateRun<'a> {
    /// Claim `id`, or `None` when another run already holds it.
    fn begin(states: &'a Mutex<HashMap<String, UpdateState>>, id: &'a str) -> Option<Self> {
        let mut map = lock(states);
        if map.get(id).is_some_and(UpdateState::is_running) {
            return None;
        }
        map.insert(id.to_string(), UpdateState::Fetching);
        Some(Self {
            states,
            id,
            finished: false,
        })
    }

    fn advance(&self, state: UpdateState) {
        lock(self.states).insert(self.id.to_string(), state);
    }

    fn finish(mut self, state: UpdateState) {
        self.advance(state);
        self.finished = true;
    }
}

impl Drop for UpdateRun<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!("Update of profile '{}' cancelled", self.id);
            self.advance(UpdateState::Failed("update cancelled".to_string()));
        }
    }
}

fn lock(states: &Mutex<HashMap<String, UpdateState>>) -> MutexGuard<'_, HashMap<String, UpdateState>> {
    states.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome of a successful update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub checksum: ChecksumStatus,
    pub summary: ProfileSummary,
}

pub struct Updater<F> {
    store: Arc<ProfileStore>,
    fetcher: F,
    states: Mutex<HashMap<String, UpdateState>>,
}

impl<F: FilterListFetcher> Updater<F> {
    pub fn new(store: Arc<ProfileStore>, fetcher: F) -> Self {
        Self {
            store,
            fetcher,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Current state of `id`'s update machine.
    pub fn state(&self, id: &str) -> UpdateState {
        self.lock_states().get(id).cloned().unwrap_or(UpdateState::Idle)
    }

    /// Whether `profile` should be refreshed at `now`.
    pub fn is_due(profile: &Profile, now: DateTime<Utc>) -> bool {
        profile.is_due(now)
    }

    /// Fetch, validate and apply an update for profile `id`.
    pub async fn trigger_update(&self, id: &str) -> Result<UpdateReport> {
        let profile = self
            .store
            .get(id)
            .ok_or_else(|| EngineError::ProfileNotFound(id.to_string()))?;
        let url = profile
            .metadata()
            .update_url
            .clone()
            .ok_or_else(|| EngineError::NoUpdateUrl(id.to_string()))?;
        if !profile.is_enabled() {
            return Err(EngineError::UpdateDiscarded(id.to_string()));
        }

        let run = UpdateRun::begin(&self.states, id).ok_or_else(|| EngineError::UpdateInProgress(id.to_string()))?;
        log::info!("Updating profile '{}' from {}", id, url);

        let body = match self.fetcher.fetch(&url).await {
            Ok(body) => body,
            Err(source) => {
                return Err(fail(
                    run,
                    EngineError::UpdateFetch {
                        id: id.to_string(),
                        source,
                    },
                ))
            }
        };

        run.advance(UpdateState::Validating);
        let checksum = match validate_checksum(&body) {
            Ok(status) => status,
            Err(source) => {
                return Err(fail(
                    run,
                    EngineError::ChecksumMismatch {
                        id: id.to_string(),
                        source,
                    },
                ))
            }
        };

        run.advance(UpdateState::Applying);
        let mut metadata = profile.metadata().clone();
        metadata.last_update = Some(Utc::now());
        metadata.checksum = None;
        let compiled = tokio::task::spawn_blocking(move || Profile::from_text(metadata, &body)).await;
        let replacement = match compiled {
            Ok(replacement) => replacement,
            Err(err) => {
                return Err(fail(
                    run,
                    EngineError::UpdateCompile {
                        id: id.to_string(),
                        reason: err.to_string(),
                    },
                ))
            }
        };
        let summary = replacement.summary();

        if let Err(err) = self.store.replace_profile(id, profile.revision(), replacement) {
            return Err(fail(run, err));
        }

        run.finish(UpdateState::Idle);
        log::info!(
            "Updated profile '{}': {} network rules, {} cosmetic rules, {} rejected lines",
            id,
            summary.network_rules,
            summary.cosmetic_rules,
            summary.parse_errors
        );
        Ok(UpdateReport { checksum, summary })
    }

    /// Update every profile that is due at `now`, one after another.
    pub async fn update_due(&self, now: DateTime<Utc>) -> Vec<(String, Result<UpdateReport>)> {
        let mut results = Vec::new();
        for id in self.store.due_for_update(now) {
            let result = self.trigger_update(&id).await;
            results.push((id, result));
        }
        results
    }

    fn lock_states(&self) -> MutexGuard<'_, HashMap<String, UpdateState>> {
        lock(&self.states)
    }
}

fn fail(run: UpdateRun<'_>, err: EngineError) -> EngineError {
    log::warn!("Update of profile '{}' failed: {}", run.id, err);
    run.finish(UpdateState::Failed(err.to_string()));
    err
}
