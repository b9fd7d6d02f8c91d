//! In-memory doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use captur_core::UserId;
use captur_sync::{
    BackendError, HistoryPoint, KeyValueStore, LocationRow, MemoryStore, NewReport,
    NewReportValidation, RemoteBackend, ReportRow, StoreError,
};
use chrono::{DateTime, Utc};

pub fn unavailable() -> BackendError {
    BackendError::Status {
        status: 503,
        url: "http://backend.test/rest/v1/locations".to_owned(),
        body: String::new(),
    }
}

/// Backend double that records every call.
pub struct FakeBackend {
    pub user: UserId,
    pub offline: AtomicBool,
    pub signed_out: AtomicBool,
    pub fail_rewards: AtomicBool,
    /// Rows with this latitude are rejected even when online.
    pub reject_latitude: Mutex<Option<f64>>,
    pub inserted: Mutex<Vec<LocationRow>>,
    pub reward_calls: AtomicU32,
    pub rewards: Mutex<Vec<(UserId, i64)>>,
    pub history: Mutex<Vec<HistoryPoint>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            user: UserId(uuid::Uuid::new_v4()),
            offline: AtomicBool::new(false),
            signed_out: AtomicBool::new(false),
            fail_rewards: AtomicBool::new(false),
            reject_latitude: Mutex::new(None),
            inserted: Mutex::new(Vec::new()),
            reward_calls: AtomicU32::new(0),
            rewards: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn inserted(&self) -> Vec<LocationRow> {
        self.inserted.lock().unwrap().clone()
    }

    pub fn reward_calls(&self) -> u32 {
        self.reward_calls.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), BackendError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(unavailable())
        } else {
            Ok(())
        }
    }
}

impl RemoteBackend for FakeBackend {
    async fn current_user(&self) -> Result<UserId, BackendError> {
        self.check_online()?;
        if self.signed_out.load(Ordering::SeqCst) {
            return Err(BackendError::NotAuthenticated);
        }
        Ok(self.user)
    }

    async fn insert_location(&self, row: &LocationRow) -> Result<(), BackendError> {
        self.check_online()?;
        if *self.reject_latitude.lock().unwrap() == Some(row.latitude) {
            return Err(BackendError::Status {
                status: 400,
                url: "http://backend.test/rest/v1/locations".to_owned(),
                body: "rejected".to_owned(),
            });
        }
        self.inserted.lock().unwrap().push(row.clone());
        Ok(())
    }

    async fn insert_location_returning_id(&self, row: &LocationRow) -> Result<i64, BackendError> {
        self.insert_location(row).await?;
        Ok(i64::try_from(self.inserted.lock().unwrap().len()).unwrap_or(i64::MAX))
    }

    async fn fetch_locations(
        &self,
        _user_id: UserId,
        limit: usize,
    ) -> Result<Vec<HistoryPoint>, BackendError> {
        self.check_online()?;
        Ok(self
            .history
            .lock()
            .unwrap()
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn increment_token_balance(&self, user_id: UserId, amount: i64) -> Result<(), BackendError> {
        self.reward_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        if self.fail_rewards.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.rewards.lock().unwrap().push((user_id, amount));
        Ok(())
    }

    async fn insert_report(&self, _report: &NewReport) -> Result<(), BackendError> {
        Err(BackendError::Unexpected("reports not modelled".to_owned()))
    }

    async fn fetch_active_reports(
        &self,
        _since: DateTime<Utc>,
    ) -> Result<Vec<ReportRow>, BackendError> {
        Ok(Vec::new())
    }

    async fn set_report_status(&self, _report_id: i64, _status: &str) -> Result<(), BackendError> {
        Err(BackendError::Unexpected("reports not modelled".to_owned()))
    }

    async fn insert_report_validation(
        &self,
        _validation: &NewReportValidation,
    ) -> Result<(), BackendError> {
        Err(BackendError::Unexpected("reports not modelled".to_owned()))
    }

    async fn count_negative_validations(&self, _report_id: i64) -> Result<u64, BackendError> {
        Ok(0)
    }
}

/// Store whose deletes can be made to fail, standing in for a crash
/// between a confirmed insert and the dequeue.
#[derive(Default)]
pub struct CrashingStore {
    pub inner: MemoryStore,
    pub fail_deletes: AtomicBool,
}

impl KeyValueStore for CrashingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: key.into(),
                source: std::io::Error::other("process killed"),
            });
        }
        self.inner.delete(key).await
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list_keys(prefix).await
    }
}
