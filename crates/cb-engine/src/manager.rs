//! Content Blocking Manager
//!
//! Evaluates requests against every enabled profile of a [`ProfileStore`]
//! and aggregates cosmetic selectors per document domain.
//!
//! Each call works on the store snapshot current when it started, so a
//! profile swap never affects a call in flight.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use cb_core::cache::LruCache;
use cb_core::matcher::Matcher;
use cb_core::types::{MatchDecision, Request, RequestContext};
use cb_core::url::host_of;

use crate::store::{ProfileStore, StoreSnapshot};

/// Cached selector sets, valid for one store generation.
struct CosmeticCache {
    generation: u64,
    entries: LruCache<Arc<BTreeSet<String>>>,
}

pub struct ContentBlockingManager {
    store: Arc<ProfileStore>,
    cosmetic_cache: Mutex<CosmeticCache>,
}

impl ContentBlockingManager {
    pub fn new(store: Arc<ProfileStore>, cosmetic_cache_capacity: usize) -> Self {
        Self {
            store,
            cosmetic_cache: Mutex::new(CosmeticCache {
                generation: 0,
                entries: LruCache::new(cosmetic_cache_capacity),
            }),
        }
    }

    pub fn store(&self) -> &Arc<ProfileStore> {
        &self.store
    }

    /// Decide whether `request` is blocked.
    ///
    /// Exceptions from any enabled profile win over blocks from any profile.
    /// Among block rules the first match is reported. Never fails: a request
    /// with no parsable host simply matches nothing host-specific.
    pub fn evaluate(&self, request: &Request) -> MatchDecision {
        let snapshot = self.store.snapshot();
        let ctx = RequestContext::from_request(request);

        // Pass 1: exceptions short-circuit across all profiles
        for profile in snapshot.enabled() {
            if let Some(rule) = Matcher::new(profile.index()).find_exception(&ctx) {
                log::trace!("{} allowed by '{}' ({})", request.url, rule.raw, profile.id());
                return MatchDecision::excepted_by(profile.id(), &rule.raw);
            }
        }

        // Pass 2: any block rule
        for profile in snapshot.enabled() {
            if let Some(rule) = Matcher::new(profile.index()).find_block(&ctx) {
                log::trace!("{} blocked by '{}' ({})", request.url, rule.raw, profile.id());
                return MatchDecision::blocked_by(profile.id(), &rule.raw);
            }
        }

        MatchDecision::allow()
    }

    /// CSS selectors to hide on pages of `document_domain`.
    ///
    /// Accepts a bare host or a full URL. The result is cached per domain
    /// until the set of profiles changes.
    pub fn cosmetic_selectors_for(&self, document_domain: &str) -> BTreeSet<String> {
        let domain = normalize_document_domain(document_domain);
        let snapshot = self.store.snapshot();

        if let Some(cached) = self.cached_selectors(&domain, snapshot.generation()) {
            return cached.as_ref().clone();
        }

        let selectors = collect_selectors(&snapshot, &domain);
        self.cache_selectors(domain, snapshot.generation(), Arc::new(selectors.clone()));
        selectors
    }

    fn cached_selectors(&self, domain: &str, generation: u64) -> Option<Arc<BTreeSet<String>>> {
        // A poisoned cache is just a cold cache
        let mut cache = self.cosmetic_cache.lock().ok()?;
        if cache.generation != generation {
            cache.entries.clear();
            cache.generation = generation;
            return None;
        }
        cache.entries.get(domain)
    }

    fn cache_selectors(&self, domain: String, generation: u64, selectors: Arc<BTreeSet<String>>) {
        if let Ok(mut cache) = self.cosmetic_cache.lock() {
            if cache.generation == generation {
                cache.entries.insert(domain, selectors);
            }
        }
    }
}

fn collect_selectors(snapshot: &StoreSnapshot, domain: &str) -> BTreeSet<String> {
    let mut selectors = BTreeSet::new();
    let mut exceptions = BTreeSet::new();

    for profile in snapshot.enabled() {
        let found = Matcher::new(profile.index()).match_cosmetics(domain);
        selectors.extend(found.selectors);
        exceptions.extend(found.exceptions);
    }

    selectors
        .into_iter()
        .filter(|selector| !exceptions.contains(selector))
        .map(str::to_string)
        .collect()
}

fn normalize_document_domain(input: &str) -> String {
    let input = input.trim();
    if input.contains("://") {
        return host_of(input);
    }
    input.trim_end_matches('.').to_ascii_lowercase()
}
