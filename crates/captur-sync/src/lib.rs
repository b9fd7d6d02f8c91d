//! Store-and-forward location sync, rewards, reports and the session
//! pipeline, over a remote backend and durable local storage.

pub mod backend;
pub mod error;
pub mod history;
pub mod logger;
pub mod reports;
pub mod rest;
pub(crate) mod retry;
pub mod reward;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod tracking;

pub use backend::{
    Coordinates, EmbeddedLocation, HistoryPoint, IdentityCache, LocationRow, NewReport,
    NewReportValidation, RemoteBackend, ReportRow,
};
pub use error::{BackendError, StoreError, TrackingError};
pub use history::{HistoryLoader, DEFAULT_HISTORY_LIMIT};
pub use logger::{
    DurableLocationLogger, LogOutcome, PendingLocationRecord, SyncReport, DEBUG_OFFLINE_KEY,
    PENDING_PREFIX,
};
pub use reports::{
    reports_geojson, Report, ReportKind, ReportProperties, ReportService, UnknownReportKind,
    DISABLE_THRESHOLD, REPORT_WINDOW_HOURS,
};
pub use rest::RestBackend;
pub use reward::{RewardCoordinator, REWARD_PER_CELL};
pub use scheduler::start_periodic_sync;
pub use session::{ExplorationSession, FixReport, SessionStart};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use tracking::{
    Accuracy, LocationProvider, PermissionStatus, TrackingController, TrackingOptions,
    TrackingState,
};
