//! Crowd-sourced road-condition reports.
//!
//! A report is pinned to a location row written at submit time. Reports stay
//! visible for [`REPORT_WINDOW_HOURS`] and are disabled once
//! [`DISABLE_THRESHOLD`] users have voted them invalid.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use captur_core::LocationFix;
use captur_grid::{Feature, FeatureCollection, Geometry};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::backend::{IdentityCache, LocationRow, NewReport, NewReportValidation, RemoteBackend};
use crate::error::BackendError;

pub const REPORT_WINDOW_HOURS: i64 = 6;

/// Negative validations at which a report is disabled.
pub const DISABLE_THRESHOLD: u64 = 3;

const STATUS_DISABLED: &str = "disabled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Crash,
    Congestion,
    Police,
    Roadworks,
    LaneClosure,
    ObjectOnRoad,
}

impl ReportKind {
    pub const ALL: [ReportKind; 6] = [
        ReportKind::Crash,
        ReportKind::Congestion,
        ReportKind::Police,
        ReportKind::Roadworks,
        ReportKind::LaneClosure,
        ReportKind::ObjectOnRoad,
    ];

    /// Name stored in the `type` column.
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            ReportKind::Crash => "Crash",
            ReportKind::Congestion => "Congestion",
            ReportKind::Police => "Police",
            ReportKind::Roadworks => "Roadworks",
            ReportKind::LaneClosure => "Lane closure",
            ReportKind::ObjectOnRoad => "Object on road",
        }
    }

    /// Map icon identifier, e.g. `lane_closure`.
    #[must_use]
    pub fn icon(self) -> String {
        self.wire_name().to_lowercase().replace(' ', "_")
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownReportKind(pub String);

impl fmt::Display for UnknownReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown report type '{}'", self.0)
    }
}

impl std::error::Error for UnknownReportKind {}

impl FromStr for ReportKind {
    type Err = UnknownReportKind;

    /// Accepts the wire name or the icon slug, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['_', '-'], " ");
        ReportKind::ALL
            .into_iter()
            .find(|k| k.wire_name().to_lowercase() == wanted)
            .ok_or_else(|| UnknownReportKind(s.to_owned()))
    }
}

/// An active report with its location resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub id: i64,
    pub kind: ReportKind,
    pub created_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportProperties {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub icon: String,
}

/// Point layer for the map, one feature per report.
#[must_use]
pub fn reports_geojson(reports: &[Report]) -> FeatureCollection<ReportProperties> {
    FeatureCollection::new(
        reports
            .iter()
            .map(|r| {
                Feature::new(
                    Geometry::Point {
                        coordinates: [r.longitude, r.latitude],
                    },
                    ReportProperties {
                        id: r.id,
                        kind: r.kind.wire_name().to_owned(),
                        icon: r.kind.icon(),
                    },
                )
            })
            .collect(),
    )
}

pub struct ReportService<B> {
    backend: Arc<B>,
    identity: Arc<IdentityCache>,
}

impl<B: RemoteBackend> ReportService<B> {
    #[must_use]
    pub fn new(backend: Arc<B>, identity: Arc<IdentityCache>) -> Self {
        Self { backend, identity }
    }

    /// Records a location row for `fix` and a report pointing at it.
    /// Returns the new location id. Nothing is queued on failure.
    ///
    /// # Errors
    ///
    /// Returns the first [`BackendError`] encountered.
    pub async fn submit_report(
        &self,
        kind: ReportKind,
        fix: &LocationFix,
    ) -> Result<i64, BackendError> {
        let user_id = self.identity.resolve(self.backend.as_ref()).await?;
        let location_id = self
            .backend
            .insert_location_returning_id(&LocationRow::from_fix(Some(user_id), fix))
            .await?;
        self.backend
            .insert_report(&NewReport {
                kind: kind.wire_name().to_owned(),
                user_id,
                location_id,
            })
            .await?;
        tracing::info!(%kind, location_id, "report submitted");
        Ok(location_id)
    }

    /// Active reports created in the last [`REPORT_WINDOW_HOURS`] before `now`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the query fails.
    pub async fn active_reports(&self, now: DateTime<Utc>) -> Result<Vec<Report>, BackendError> {
        let since = now - Duration::hours(REPORT_WINDOW_HOURS);
        let rows = self.backend.fetch_active_reports(since).await?;
        let reports: Vec<Report> = rows
            .into_iter()
            .filter_map(|row| {
                let Some(coords) = row.locations.as_ref().and_then(|l| l.first()) else {
                    tracing::debug!(id = row.id, "skipping report without a location");
                    return None;
                };
                let kind = match row.kind.parse::<ReportKind>() {
                    Ok(kind) => kind,
                    Err(e) => {
                        tracing::debug!(id = row.id, error = %e, "skipping report");
                        return None;
                    }
                };
                Some(Report {
                    id: row.id,
                    kind,
                    created_at: row.created_at,
                    latitude: coords.latitude,
                    longitude: coords.longitude,
                })
            })
            .collect();
        tracing::debug!(count = reports.len(), %since, "active reports loaded");
        Ok(reports)
    }

    /// Records the user's vote. A negative vote that brings the report to
    /// [`DISABLE_THRESHOLD`] negative votes disables it; returns whether
    /// that happened.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if any backend call fails.
    pub async fn validate_report(&self, report_id: i64, is_valid: bool) -> Result<bool, BackendError> {
        let user_id = self.identity.resolve(self.backend.as_ref()).await?;
        self.backend
            .insert_report_validation(&NewReportValidation {
                report_id,
                user_id,
                is_valid,
            })
            .await?;
        if is_valid {
            return Ok(false);
        }

        let negatives = self.backend.count_negative_validations(report_id).await?;
        if negatives < DISABLE_THRESHOLD {
            return Ok(false);
        }
        self.backend
            .set_report_status(report_id, STATUS_DISABLED)
            .await?;
        tracing::info!(report_id, negatives, "report disabled by negative votes");
        Ok(true)
    }
}
