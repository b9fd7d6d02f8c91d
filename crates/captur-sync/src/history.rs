use std::sync::Arc;

use captur_core::LocationFix;

use crate::backend::{IdentityCache, RemoteBackend};

/// Default cap on fetched history.
pub const DEFAULT_HISTORY_LIMIT: usize = 500;

/// Loads the user's recorded fixes once per session to seed the visited set
/// and the path track.
pub struct HistoryLoader<B> {
    backend: Arc<B>,
    identity: Arc<IdentityCache>,
}

impl<B: RemoteBackend> HistoryLoader<B> {
    #[must_use]
    pub fn new(backend: Arc<B>, identity: Arc<IdentityCache>) -> Self {
        Self { backend, identity }
    }

    /// Up to `limit` fixes, oldest first. Any failure yields an empty history;
    /// rows with invalid coordinates are skipped.
    pub async fn fetch_history(&self, limit: usize) -> Vec<LocationFix> {
        if limit == 0 {
            return Vec::new();
        }
        let user_id = match self.identity.resolve(self.backend.as_ref()).await {
            Ok(user_id) => user_id,
            Err(e) => {
                tracing::warn!(error = %e, "history unavailable: user unknown");
                return Vec::new();
            }
        };
        let points = match self.backend.fetch_locations(user_id, limit).await {
            Ok(points) => points,
            Err(e) => {
                tracing::warn!(error = %e, "history fetch failed");
                return Vec::new();
            }
        };

        let mut fixes: Vec<LocationFix> = points
            .into_iter()
            .filter_map(|p| match LocationFix::new(p.latitude, p.longitude) {
                Ok(fix) => Some(fix.with_timestamp(p.created_at)),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed history row");
                    None
                }
            })
            .collect();
        fixes.truncate(limit);
        tracing::info!(count = fixes.len(), limit, "location history loaded");
        fixes
    }
}
