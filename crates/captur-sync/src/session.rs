//! One signed-in exploration session: durable logging, the visitation grid,
//! rewards and the travelled path, wired together in the order fixes flow
//! through them.

use std::sync::Arc;

use captur_core::{FixError, LocationFix, RawFix};
use captur_grid::{
    CellProperties, Feature, FeatureCollection, FixOutcome, GridSettings, NoProperties, PathTrack,
    VisitationGridManager,
};

use crate::backend::{IdentityCache, RemoteBackend};
use crate::error::{StoreError, TrackingError};
use crate::history::HistoryLoader;
use crate::logger::{DurableLocationLogger, LogOutcome, SyncReport, PENDING_PREFIX};
use crate::reward::RewardCoordinator;
use crate::store::KeyValueStore;
use crate::tracking::{LocationProvider, TrackingController, TrackingState};

/// What [`ExplorationSession::start`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStart {
    pub synced: SyncReport,
    pub history_len: usize,
}

/// What happened to one incoming fix.
#[derive(Debug, Clone, PartialEq)]
pub enum FixReport {
    /// Malformed sample; nothing was logged or processed.
    Rejected(FixError),
    Accepted {
        logged: LogOutcome,
        grid: FixOutcome,
        /// A reward credit went through for this fix.
        rewarded: bool,
    },
}

pub struct ExplorationSession<B, S> {
    logger: DurableLocationLogger<B, S>,
    rewards: RewardCoordinator<B>,
    history_loader: HistoryLoader<B>,
    history_limit: usize,
    grid: VisitationGridManager,
    path: PathTrack,
    /// History waiting for the grid to exist.
    unseeded: Vec<LocationFix>,
}

impl<B: RemoteBackend, S: KeyValueStore> ExplorationSession<B, S> {
    #[must_use]
    pub fn new(
        backend: Arc<B>,
        store: Arc<S>,
        settings: GridSettings,
        history_limit: usize,
    ) -> Self {
        let identity = Arc::new(IdentityCache::new());
        Self {
            logger: DurableLocationLogger::with_identity(
                Arc::clone(&backend),
                store,
                Arc::clone(&identity),
            ),
            rewards: RewardCoordinator::new(Arc::clone(&backend), Arc::clone(&identity)),
            history_loader: HistoryLoader::new(backend, identity),
            history_limit,
            grid: VisitationGridManager::new(settings),
            path: PathTrack::default(),
            unseeded: Vec::new(),
        }
    }

    /// Foreground logger. Clone it to hand the background context its own
    /// handle over the same store.
    #[must_use]
    pub fn logger(&self) -> &DurableLocationLogger<B, S> {
        &self.logger
    }

    #[must_use]
    pub fn grid(&self) -> &VisitationGridManager {
        &self.grid
    }

    /// Drains the queue left by earlier sessions, then loads history for the
    /// path and for seeding once the grid exists.
    pub async fn start(&mut self) -> SessionStart {
        let synced = self.logger.sync_pending().await;
        let history = self.history_loader.fetch_history(self.history_limit).await;
        self.path = PathTrack::from_history(&history);
        let history_len = history.len();
        if self.grid.is_initialized() {
            self.grid.seed_from_history(&history);
        } else {
            self.unseeded = history;
        }
        SessionStart {
            synced,
            history_len,
        }
    }

    /// Runs one raw sample through the pipeline: validate, log durably,
    /// update the grid, reward a newly visited cell.
    pub async fn handle_fix(&mut self, raw: RawFix) -> FixReport {
        let fix = match LocationFix::try_from(raw) {
            Ok(fix) => fix,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed fix");
                return FixReport::Rejected(e);
            }
        };

        let logged = self.logger.log_fix(&fix).await;

        if self.grid.initialize(&fix) {
            let history = std::mem::take(&mut self.unseeded);
            self.grid.seed_from_history(&history);
        }
        let grid = self.grid.process_fix(&fix);
        self.path.push(&fix);

        let rewarded = match grid.cell {
            Some(cell) if grid.newly_visited => self.rewards.on_new_cell_visited(cell).await,
            _ => false,
        };

        FixReport::Accepted {
            logged,
            grid,
            rewarded,
        }
    }

    #[must_use]
    pub fn overlay(&self) -> FeatureCollection<CellProperties> {
        self.grid.overlay_geojson()
    }

    #[must_use]
    pub fn path(&self) -> Feature<NoProperties> {
        self.path.to_geojson()
    }

    /// Syncs pending records, then starts or stops tracking.
    ///
    /// # Errors
    ///
    /// Propagates the controller's [`TrackingError`].
    pub async fn set_tracking<P: LocationProvider>(
        &self,
        controller: &mut TrackingController<P>,
        enabled: bool,
    ) -> Result<TrackingState, TrackingError> {
        self.logger.sync_pending().await;
        if enabled {
            controller.start().await
        } else {
            controller.stop().await?;
            Ok(controller.state())
        }
    }

    /// Ends the session: syncs, then clears local settings. Records that are
    /// still pending after the sync attempt stay on disk for the next session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if local keys cannot be listed or removed.
    pub async fn sign_out(self) -> Result<SyncReport, StoreError> {
        let report = self.logger.sync_pending().await;
        let store = self.logger.store();
        let mut cleared = 0usize;
        for key in store.list_keys("").await? {
            if key.starts_with(PENDING_PREFIX) {
                continue;
            }
            store.delete(&key).await?;
            cleared += 1;
        }
        tracing::info!(
            cleared,
            still_pending = report.failed,
            "signed out"
        );
        Ok(report)
    }
}
