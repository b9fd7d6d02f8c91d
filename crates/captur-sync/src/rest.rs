//! HTTP client for a PostgREST-style backend (tables under `/rest/v1`,
//! RPCs under `/rest/v1/rpc`, identity under `/auth/v1`).
//!
//! Every request carries the project `apikey` and a bearer token (the user's
//! session token when present, the anon key otherwise). Transient failures
//! are retried with back-off; everything else surfaces as [`BackendError`].

use std::time::Duration;

use captur_core::{AppConfig, UserId};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderValue, CONTENT_RANGE};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::backend::{
    HistoryPoint, LocationRow, NewReport, NewReportValidation, RemoteBackend, ReportRow,
};
use crate::error::BackendError;
use crate::retry::retry_with_backoff;

const PREFER: &str = "Prefer";

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: uuid::Uuid,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: i64,
}

/// Client for the backend's REST surface.
///
/// Use [`RestBackend::new`] with explicit settings (tests point it at a
/// wiremock server) or [`RestBackend::from_config`] in production.
pub struct RestBackend {
    client: Client,
    base_url: Url,
    anon_key: String,
    access_token: Option<String>,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl RestBackend {
    /// # Errors
    ///
    /// Returns [`BackendError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`BackendError::InvalidBaseUrl`] if
    /// `base_url` does not parse.
    pub fn new(
        base_url: &str,
        anon_key: &str,
        access_token: Option<&str>,
        timeout_secs: u64,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("captur/0.1 (location-sync)")
            .build()?;

        // Exactly one trailing slash so `Url::join` appends instead of replacing
        // the last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| BackendError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url,
            anon_key: anon_key.to_owned(),
            access_token: access_token.map(str::to_owned),
            max_retries,
            backoff_base_ms,
        })
    }

    /// # Errors
    ///
    /// Same as [`RestBackend::new`].
    pub fn from_config(config: &AppConfig) -> Result<Self, BackendError> {
        Self::new(
            &config.backend_url,
            &config.anon_key,
            config.access_token.as_deref(),
            config.request_timeout_secs,
            config.max_retries,
            config.retry_backoff_base_ms,
        )
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::InvalidBaseUrl {
                url: format!("{}{path}", self.base_url),
                reason: e.to_string(),
            })
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    /// Builds and sends a fresh request per attempt, retrying transient
    /// failures, and maps non-2xx statuses to errors.
    async fn execute<F>(&self, build: F) -> Result<Response, BackendError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            let request = build();
            async move {
                let response = request.send().await?;
                check_status(response).await
            }
        })
        .await
    }

    /// Sends a request exactly once. For calls that are not safe to repeat
    /// when the first attempt may already have been applied.
    async fn send_once(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = request.send().await?;
        check_status(response).await
    }

    async fn execute_json<T, F>(&self, build: F, context: &str) -> Result<T, BackendError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let response = self.execute(build).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| BackendError::Deserialize {
            context: context.to_owned(),
            source: e,
        })
    }
}

async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(BackendError::NotAuthenticated);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        url,
        body,
    })
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/3`.
fn parse_content_range_total(value: Option<&HeaderValue>) -> Option<u64> {
    let raw = value?.to_str().ok()?;
    let (_, total) = raw.rsplit_once('/')?;
    total.trim().parse().ok()
}

impl RemoteBackend for RestBackend {
    async fn current_user(&self) -> Result<UserId, BackendError> {
        if self.access_token.is_none() {
            return Err(BackendError::NotAuthenticated);
        }
        let url = self.endpoint("auth/v1/user")?;
        let user: UserResponse = self
            .execute_json(|| self.request(Method::GET, url.clone()), "auth/v1/user")
            .await?;
        Ok(UserId(user.id))
    }

    async fn insert_location(&self, row: &LocationRow) -> Result<(), BackendError> {
        let url = self.endpoint("rest/v1/locations")?;
        self.execute(|| {
            self.request(Method::POST, url.clone())
                .header(PREFER, "return=minimal")
                .json(row)
        })
        .await?;
        Ok(())
    }

    async fn insert_location_returning_id(&self, row: &LocationRow) -> Result<i64, BackendError> {
        let mut url = self.endpoint("rest/v1/locations")?;
        url.query_pairs_mut().append_pair("select", "id");
        let rows: Vec<IdRow> = self
            .execute_json(
                || {
                    self.request(Method::POST, url.clone())
                        .header(PREFER, "return=representation")
                        .json(row)
                },
                "insert locations",
            )
            .await?;
        rows.first()
            .map(|r| r.id)
            .ok_or_else(|| BackendError::Unexpected("insert returned no rows".to_owned()))
    }

    async fn fetch_locations(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<HistoryPoint>, BackendError> {
        let mut url = self.endpoint("rest/v1/locations")?;
        url.query_pairs_mut()
            .append_pair("select", "latitude,longitude,created_at")
            .append_pair("user_id", &format!("eq.{user_id}"))
            .append_pair("order", "created_at.asc")
            .append_pair("limit", &limit.to_string());
        self.execute_json(|| self.request(Method::GET, url.clone()), "select locations")
            .await
    }

    async fn increment_token_balance(&self, user_id: UserId, amount: i64) -> Result<(), BackendError> {
        let url = self.endpoint("rest/v1/rpc/increment_token_balance")?;
        let body = serde_json::json!({ "user_id": user_id, "amount": amount });
        self.send_once(self.request(Method::POST, url).json(&body))
            .await?;
        Ok(())
    }

    async fn insert_report(&self, report: &NewReport) -> Result<(), BackendError> {
        let url = self.endpoint("rest/v1/reports")?;
        self.execute(|| {
            self.request(Method::POST, url.clone())
                .header(PREFER, "return=minimal")
                .json(report)
        })
        .await?;
        Ok(())
    }

    async fn fetch_active_reports(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ReportRow>, BackendError> {
        let mut url = self.endpoint("rest/v1/reports")?;
        url.query_pairs_mut()
            .append_pair(
                "select",
                "id,type,created_at,status,locations:location_id(latitude,longitude)",
            )
            .append_pair(
                "created_at",
                &format!("gte.{}", since.to_rfc3339_opts(SecondsFormat::Secs, true)),
            )
            .append_pair("status", "eq.active");
        self.execute_json(|| self.request(Method::GET, url.clone()), "select reports")
            .await
    }

    async fn set_report_status(&self, report_id: i64, status: &str) -> Result<(), BackendError> {
        let mut url = self.endpoint("rest/v1/reports")?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{report_id}"));
        let body = serde_json::json!({ "status": status });
        self.execute(|| {
            self.request(Method::PATCH, url.clone())
                .header(PREFER, "return=minimal")
                .json(&body)
        })
        .await?;
        Ok(())
    }

    async fn insert_report_validation(
        &self,
        validation: &NewReportValidation,
    ) -> Result<(), BackendError> {
        let url = self.endpoint("rest/v1/report_validations")?;
        self.execute(|| {
            self.request(Method::POST, url.clone())
                .header(PREFER, "return=minimal")
                .json(validation)
        })
        .await?;
        Ok(())
    }

    async fn count_negative_validations(&self, report_id: i64) -> Result<u64, BackendError> {
        let mut url = self.endpoint("rest/v1/report_validations")?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("report_id", &format!("eq.{report_id}"))
            .append_pair("is_valid", "eq.false");
        let response = self
            .execute(|| {
                self.request(Method::HEAD, url.clone())
                    .header(PREFER, "count=exact")
            })
            .await?;
        parse_content_range_total(response.headers().get(CONTENT_RANGE)).ok_or_else(|| {
            BackendError::Unexpected("missing or malformed Content-Range header".to_owned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_total_parses_both_forms() {
        let full = HeaderValue::from_static("0-24/3573");
        let head = HeaderValue::from_static("*/3");
        assert_eq!(parse_content_range_total(Some(&full)), Some(3573));
        assert_eq!(parse_content_range_total(Some(&head)), Some(3));
    }

    #[test]
    fn content_range_without_total_is_rejected() {
        let unknown = HeaderValue::from_static("0-24/*");
        assert_eq!(parse_content_range_total(Some(&unknown)), None);
        assert_eq!(parse_content_range_total(None), None);
    }

    #[test]
    fn base_url_is_normalised_with_one_trailing_slash() {
        let backend = RestBackend::new("http://localhost:54321///", "anon", None, 5, 0, 0).unwrap();
        let url = backend.endpoint("rest/v1/locations").unwrap();
        assert_eq!(url.as_str(), "http://localhost:54321/rest/v1/locations");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = RestBackend::new("not a url", "anon", None, 5, 0, 0);
        assert!(matches!(result, Err(BackendError::InvalidBaseUrl { .. })));
    }

    #[tokio::test]
    async fn current_user_without_token_is_not_authenticated() {
        let backend = RestBackend::new("http://localhost:54321", "anon", None, 5, 0, 0).unwrap();
        assert!(matches!(
            backend.current_user().await,
            Err(BackendError::NotAuthenticated)
        ));
    }
}
