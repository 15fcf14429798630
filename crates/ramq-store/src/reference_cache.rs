// crates/ramq-store/src/reference_cache.rs
// ============================================================================
// Module: Reference Cache
// Description: TTL-based refresh of the four reference tables into a snapshot.
// Purpose: Implement SPEC_FULL.md §4.1 (staleness, coalescing, fallback).
// Dependencies: crate::store, ramq-core
// ============================================================================

//! ## Overview
//! Codes, contexts, and establishments share a short TTL (defaulting to one
//! hour); rules use a much longer one (defaulting to one day), since rule
//! definitions change far less often than the tariff table. A single mutex
//! guards the cached state, so a refresh in progress naturally coalesces
//! concurrent callers onto one store round trip rather than stampeding it.
//! When a refresh fails and a previous snapshot exists, that snapshot is
//! served again with [`ramq_core::ReferenceSnapshot::mark_stale`] set; a run
//! only fails outright when no snapshot has ever been built.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use ramq_core::BillingCode;
use ramq_core::Establishment;
use ramq_core::ReferenceSnapshot;
use ramq_core::Rule;
use thiserror::Error;
use tracing::warn;

use crate::store::SqliteStore;
use crate::store::StoreError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced while serving a [`ReferenceSnapshot`].
#[derive(Debug, Error)]
pub enum ReferenceCacheError {
    /// No snapshot has ever been successfully built, and the current refresh
    /// attempt also failed, so there is nothing to fall back to.
    #[error("reference store unavailable and no prior snapshot exists: {0}")]
    Unavailable(#[source] StoreError),
}

// ============================================================================
// SECTION: Cached State
// ============================================================================

/// Last successfully loaded reference rows, with per-family fetch timestamps.
struct CachedState {
    /// Last loaded billing codes.
    codes: Vec<BillingCode>,
    /// Last loaded context element names.
    contexts: std::collections::BTreeSet<String>,
    /// Last loaded establishments.
    establishments: Vec<Establishment>,
    /// When `codes`/`contexts`/`establishments` were last fetched.
    fast_fetched_at: Instant,
    /// Last loaded enabled rules.
    rules: Vec<Rule>,
    /// When `rules` was last fetched.
    rules_fetched_at: Instant,
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// TTL-governed cache producing [`ReferenceSnapshot`] values for rule handlers.
pub struct ReferenceCache {
    /// Backing store consulted on refresh.
    store: SqliteStore,
    /// TTL applied to codes/contexts/establishments.
    fast_ttl: Duration,
    /// TTL applied to rules.
    rules_ttl: Duration,
    /// Cached rows, `None` before the first successful load.
    state: Mutex<Option<CachedState>>,
}

impl ReferenceCache {
    /// Creates a cache with the given codes/contexts/establishments TTL and
    /// rules TTL, both expressed in seconds (SPEC_FULL.md §12 `RamqConfig`).
    #[must_use]
    pub fn new(store: SqliteStore, fast_ttl_seconds: u64, rules_ttl_seconds: u64) -> Self {
        Self {
            store,
            fast_ttl: Duration::from_secs(fast_ttl_seconds),
            rules_ttl: Duration::from_secs(rules_ttl_seconds),
            state: Mutex::new(None),
        }
    }

    /// Returns a current [`ReferenceSnapshot`], refreshing whichever parts of
    /// the cache have exceeded their TTL.
    ///
    /// # Errors
    ///
    /// Returns [`ReferenceCacheError::Unavailable`] only when the store is
    /// unreachable on the very first load, i.e. no fallback snapshot exists.
    pub fn snapshot(&self) -> Result<ReferenceSnapshot, ReferenceCacheError> {
        let mut guard = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let Some(cached) = guard.as_mut() else {
            let fresh = self.load_all()?;
            let snapshot = Self::build_snapshot(&fresh, false);
            *guard = Some(fresh);
            return Ok(snapshot);
        };

        let needs_fast = cached.fast_fetched_at.elapsed() >= self.fast_ttl;
        let needs_rules = cached.rules_fetched_at.elapsed() >= self.rules_ttl;

        if !needs_fast && !needs_rules {
            return Ok(Self::build_snapshot(cached, false));
        }

        let mut served_stale = false;

        if needs_fast {
            match self.store.list_codes().and_then(|codes| {
                let contexts = self.store.list_contexts()?;
                let establishments = self.store.list_establishments()?;
                Ok((codes, contexts, establishments))
            }) {
                Ok((codes, contexts, establishments)) => {
                    cached.codes = codes;
                    cached.contexts = contexts;
                    cached.establishments = establishments;
                    cached.fast_fetched_at = Instant::now();
                }
                Err(error) => {
                    warn!(error = %error, "reference cache: fast-table refresh failed, serving stale snapshot");
                    served_stale = true;
                }
            }
        }

        if needs_rules {
            match self.store.list_enabled_rules() {
                Ok(rules) => {
                    cached.rules = rules;
                    cached.rules_fetched_at = Instant::now();
                }
                Err(error) => {
                    warn!(error = %error, "reference cache: rules refresh failed, serving stale snapshot");
                    served_stale = true;
                }
            }
        }

        Ok(Self::build_snapshot(cached, served_stale))
    }

    /// Forces both the fast tables and rules to be reloaded on the next call,
    /// used after an administrative write to the reference tables.
    pub fn invalidate(&self) {
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }

    /// Loads every reference family from the store, used only on first access.
    fn load_all(&self) -> Result<CachedState, ReferenceCacheError> {
        let codes = self.store.list_codes().map_err(ReferenceCacheError::Unavailable)?;
        let contexts = self.store.list_contexts().map_err(ReferenceCacheError::Unavailable)?;
        let establishments = self.store.list_establishments().map_err(ReferenceCacheError::Unavailable)?;
        let rules = self.store.list_enabled_rules().map_err(ReferenceCacheError::Unavailable)?;
        let now = Instant::now();
        Ok(CachedState { codes, contexts, establishments, fast_fetched_at: now, rules, rules_fetched_at: now })
    }

    /// Materializes an indexed snapshot from cached rows, marking it stale
    /// when it is being served despite a failed refresh.
    fn build_snapshot(cached: &CachedState, stale: bool) -> ReferenceSnapshot {
        let snapshot = ReferenceSnapshot::build(
            cached.codes.clone(),
            cached.rules.clone(),
            cached.contexts.clone(),
            cached.establishments.clone(),
        );
        if stale { snapshot.mark_stale() } else { snapshot }
    }
}
