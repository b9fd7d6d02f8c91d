//! Store-and-forward location logging.
//!
//! Each fix is written to the backend directly. When that fails, or when the
//! debug offline flag is set, the fix is queued in durable storage under a
//! key unique to that attempt. [`DurableLocationLogger::sync_pending`] drains
//! the queue later, deleting a record only after the backend accepted it.
//!
//! Delivery is at-least-once: a crash between a successful insert and the
//! key deletion re-sends that record on the next pass. Several loggers (the
//! foreground and background contexts) may share one store without a lock.

use std::sync::Arc;

use captur_core::{LocationFix, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{IdentityCache, LocationRow, RemoteBackend};
use crate::error::StoreError;
use crate::store::KeyValueStore;

/// Prefix of every queued location key.
pub const PENDING_PREFIX: &str = "pending_location_";

/// Storage key of the debug "simulate offline" flag.
pub const DEBUG_OFFLINE_KEY: &str = "appSettings:debugOfflineMode";

/// A queued location as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingLocationRecord {
    #[serde(flatten)]
    pub row: LocationRow,
    pub enqueued_at: DateTime<Utc>,
}

/// What became of one fix handed to [`DurableLocationLogger::log_fix`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutcome {
    /// The backend accepted the row.
    Persisted,
    /// The remote write failed (or was skipped) and the fix is queued.
    Queued { key: String },
    /// Neither the backend nor local storage took the fix.
    Dropped,
}

impl LogOutcome {
    #[must_use]
    pub fn is_durable(&self) -> bool {
        !matches!(self, LogOutcome::Dropped)
    }
}

/// Summary of one [`DurableLocationLogger::sync_pending`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
    /// Records left queued for a later pass.
    pub failed: usize,
    /// Unreadable records removed from the queue.
    pub discarded: usize,
}

impl SyncReport {
    /// `true` when nothing was left behind.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Builds a queue key that sorts by enqueue time and is unique per attempt.
fn pending_key(now: DateTime<Utc>) -> String {
    format!(
        "{PENDING_PREFIX}{:020}_{}",
        now.timestamp_micros(),
        uuid::Uuid::new_v4().simple()
    )
}

pub struct DurableLocationLogger<B, S> {
    backend: Arc<B>,
    store: Arc<S>,
    identity: Arc<IdentityCache>,
}

impl<B, S> Clone for DurableLocationLogger<B, S> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            store: Arc::clone(&self.store),
            identity: Arc::clone(&self.identity),
        }
    }
}

impl<B: RemoteBackend, S: KeyValueStore> DurableLocationLogger<B, S> {
    #[must_use]
    pub fn new(backend: Arc<B>, store: Arc<S>) -> Self {
        Self::with_identity(backend, store, Arc::new(IdentityCache::new()))
    }

    /// Shares an identity cache with other components of the same session.
    #[must_use]
    pub fn with_identity(backend: Arc<B>, store: Arc<S>, identity: Arc<IdentityCache>) -> Self {
        Self {
            backend,
            store,
            identity,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Writes the fix to the backend, queuing it durably on any failure.
    pub async fn log_fix(&self, fix: &LocationFix) -> LogOutcome {
        if self.debug_offline().await {
            tracing::debug!("debug offline mode set; queuing fix without a remote attempt");
            let row = LocationRow::from_fix(self.identity.cached(), fix);
            return self.enqueue(row).await;
        }

        let user_id = match self.identity.resolve(self.backend.as_ref()).await {
            Ok(user_id) => user_id,
            Err(e) => {
                tracing::warn!(error = %e, "could not resolve user; queuing fix");
                return self.enqueue(LocationRow::from_fix(None, fix)).await;
            }
        };

        let row = LocationRow::from_fix(Some(user_id), fix);
        match self.backend.insert_location(&row).await {
            Ok(()) => {
                tracing::debug!(lat = fix.latitude, lng = fix.longitude, "location persisted");
                LogOutcome::Persisted
            }
            Err(e) => {
                tracing::warn!(error = %e, "location insert failed; queuing fix");
                self.enqueue(row).await
            }
        }
    }

    /// Logs fixes delivered together by the background context, in order.
    pub async fn log_batch(&self, fixes: &[LocationFix]) -> Vec<LogOutcome> {
        let mut outcomes = Vec::with_capacity(fixes.len());
        for fix in fixes {
            outcomes.push(self.log_fix(fix).await);
        }
        outcomes
    }

    async fn enqueue(&self, row: LocationRow) -> LogOutcome {
        let now = Utc::now();
        let key = pending_key(now);
        let record = PendingLocationRecord {
            row,
            enqueued_at: now,
        };
        match self.write_record(&key, &record).await {
            Ok(()) => {
                tracing::info!(key = %key, "location queued for later sync");
                LogOutcome::Queued { key }
            }
            Err(e) => {
                tracing::error!(error = %e, key = %key, "could not queue location; fix lost");
                LogOutcome::Dropped
            }
        }
    }

    async fn write_record(&self, key: &str, record: &PendingLocationRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(record)?;
        self.store.set(key, &payload).await
    }

    /// Keys of every queued record, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be listed.
    pub async fn pending_keys(&self) -> Result<Vec<String>, StoreError> {
        self.store.list_keys(PENDING_PREFIX).await
    }

    /// Sends every queued record to the backend.
    ///
    /// Records the backend accepts are deleted; the rest stay queued.
    /// Records that no longer parse are deleted and counted as discarded.
    pub async fn sync_pending(&self) -> SyncReport {
        let mut report = SyncReport::default();
        let keys = match self.pending_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "could not list pending locations");
                return report;
            }
        };
        if keys.is_empty() {
            return report;
        }

        for key in keys {
            let raw = match self.store.get(&key).await {
                Ok(Some(raw)) => raw,
                // Another context synced it first.
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, key = %key, "could not read pending location");
                    report.attempted += 1;
                    report.failed += 1;
                    continue;
                }
            };
            report.attempted += 1;

            let mut record: PendingLocationRecord = match serde_json::from_str(&raw) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(error = %e, key = %key, "discarding unreadable pending location");
                    if let Err(e) = self.store.delete(&key).await {
                        tracing::warn!(error = %e, key = %key, "could not delete unreadable record");
                    }
                    report.discarded += 1;
                    continue;
                }
            };

            if record.row.user_id.is_none() {
                match self.identity.resolve(self.backend.as_ref()).await {
                    Ok(user_id) => record.row.user_id = Some(user_id),
                    Err(e) => {
                        tracing::warn!(error = %e, key = %key, "user unknown; leaving location queued");
                        report.failed += 1;
                        continue;
                    }
                }
            }

            if let Err(e) = self.backend.insert_location(&record.row).await {
                tracing::warn!(error = %e, key = %key, "pending location sync failed");
                report.failed += 1;
                continue;
            }
            // A failed delete only means the record is sent again next pass.
            if let Err(e) = self.store.delete(&key).await {
                tracing::warn!(error = %e, key = %key, "synced location could not be dequeued");
            }
            report.synced += 1;
        }

        tracing::info!(
            attempted = report.attempted,
            synced = report.synced,
            failed = report.failed,
            discarded = report.discarded,
            "pending location sync finished"
        );
        report
    }

    /// Reads the debug offline flag. A missing or unreadable flag is off.
    pub async fn debug_offline(&self) -> bool {
        match self.store.get(DEBUG_OFFLINE_KEY).await {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                tracing::warn!(error = %e, "could not read debug offline flag");
                false
            }
        }
    }

    /// # Errors
    ///
    /// Returns [`StoreError`] if the flag cannot be written.
    pub async fn set_debug_offline(&self, enabled: bool) -> Result<(), StoreError> {
        self.store
            .set(DEBUG_OFFLINE_KEY, if enabled { "true" } else { "false" })
            .await?;
        tracing::info!(enabled, "debug offline mode updated");
        Ok(())
    }

    /// User id, if already resolved this session.
    #[must_use]
    pub fn cached_user(&self) -> Option<UserId> {
        self.identity.cached()
    }
}
