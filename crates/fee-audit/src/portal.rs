//! Fee portal API integration
//!
//! Logs in once with the configured credentials, then pages through the
//! manifests of every configured run. Each manifest item is already
//! aggregated per (run, contract, date).

use chrono::NaiveDate;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants;
use crate::records::{RawFee, RawValue};

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("invalid portal URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("portal request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("portal returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("could not decode portal response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("login rejected: {0}")]
    Login(String),
}

/// Connection settings and the runs to fetch
#[derive(Debug, Clone)]
pub struct PortalSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub runs: Vec<String>,
    pub page_size: u32,
}

// =============================================================================
// Portal API Types
// =============================================================================

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ManifestPage {
    #[serde(default)]
    items: Vec<ManifestItem>,
    page: u32,
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct ManifestItem {
    #[serde(default)]
    run: serde_json::Value,
    #[serde(default)]
    contract: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    agent_fee: serde_json::Value,
}

impl ManifestItem {
    fn into_raw(self) -> RawFee {
        RawFee {
            run: RawValue::from(&self.run),
            contract: self.contract,
            amount: RawValue::from(&self.agent_fee),
            date: self
                .date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok()),
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// An authenticated portal session
pub struct PortalClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl PortalClient {
    /// Exchange username/password for a bearer token
    pub async fn login(base_url: &str, username: &str, password: &str) -> Result<Self, PortalError> {
        let http = reqwest::Client::new();
        let base_url = base_url.trim_end_matches('/').to_string();
        let url = endpoint(&base_url, constants::PORTAL_LOGIN_PATH, &[])?;

        let response = http
            .post(url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PortalError::Login(format!("{}: {}", status, body)));
        }
        let login: LoginResponse = serde_json::from_str(&body)?;

        Ok(Self {
            http,
            base_url,
            token: login.token,
        })
    }

    async fn fetch_page(
        &self,
        run: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        page: u32,
        page_size: u32,
    ) -> Result<ManifestPage, PortalError> {
        let mut params = vec![
            ("run", run.to_string()),
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ];
        if let Some(from) = from {
            params.push(("from", from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = to {
            params.push(("to", to.format("%Y-%m-%d").to_string()));
        }
        let url = endpoint(&self.base_url, constants::PORTAL_MANIFESTS_PATH, &params)?;

        let response = self.http.get(url).bearer_auth(&self.token).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PortalError::Status { status, body });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

fn endpoint(base_url: &str, path: &str, params: &[(&str, String)]) -> Result<Url, PortalError> {
    let raw = format!("{}{}", base_url, path);
    Url::parse_with_params(&raw, params).map_err(|e| PortalError::InvalidUrl {
        url: raw.clone(),
        reason: e.to_string(),
    })
}

// =============================================================================
// Fetching
// =============================================================================

/// A page that could not be fetched or decoded
#[derive(Debug)]
pub struct PageFailure {
    pub run: String,
    pub page: u32,
    pub error: PortalError,
}

/// Everything one portal pass produced
#[derive(Debug, Default)]
pub struct PortalFetch {
    pub fees: Vec<RawFee>,
    pub pages: usize,
    pub failures: Vec<PageFailure>,
}

/// Fetch every manifest of every configured run within the window
///
/// Only a failed login is an error. A failed page is recorded and the next
/// page is tried; if the first page of a run fails the page count is
/// unknown, so that run is abandoned.
pub async fn fetch_fees(
    settings: &PortalSettings,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<PortalFetch, PortalError> {
    let client = PortalClient::login(&settings.base_url, &settings.username, &settings.password).await?;
    let mut fetch = PortalFetch::default();

    for run in &settings.runs {
        let mut total_pages: Option<u32> = None;
        let mut page = 1;

        loop {
            match client.fetch_page(run, from, to, page, settings.page_size).await {
                Ok(data) => {
                    log::debug!(
                        "Run {}: page {}/{} with {} manifest(s)",
                        run,
                        data.page,
                        data.total_pages,
                        data.items.len()
                    );
                    total_pages = Some(data.total_pages);
                    fetch.pages += 1;
                    fetch.fees.extend(data.items.into_iter().map(ManifestItem::into_raw));
                }
                Err(error) => {
                    log::warn!("Run {}: page {} skipped: {}", run, page, error);
                    fetch.failures.push(PageFailure {
                        run: run.clone(),
                        page,
                        error,
                    });
                    if total_pages.is_none() {
                        break;
                    }
                }
            }

            page += 1;
            if page > total_pages.unwrap_or(0) {
                break;
            }
        }
    }

    Ok(fetch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn settings(server: &MockServer, runs: &[&str]) -> PortalSettings {
        PortalSettings {
            base_url: server.base_url(),
            username: "audit".to_string(),
            password: "secret".to_string(),
            runs: runs.iter().map(|r| r.to_string()).collect(),
            page_size: 2,
        }
    }

    async fn mock_login(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/auth/login")
                    .json_body(json!({"username": "audit", "password": "secret"}));
                then.status(200).json_body(json!({"token": "tok-1"}));
            })
            .await;
    }

    #[tokio::test]
    async fn test_fetch_pages_through_manifests() {
        let server = MockServer::start_async().await;
        mock_login(&server).await;

        let first = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/manifests")
                    .header("authorization", "Bearer tok-1")
                    .query_param("run", "5")
                    .query_param("page", "1")
                    .query_param("from", "2025-06-16");
                then.status(200).json_body(json!({
                    "items": [
                        {"run": 5, "contract": "BEX", "date": "2025-06-20", "agent_fee": 50},
                        {"run": "5", "date": "2025-06-20", "agent_fee": "12.50"}
                    ],
                    "page": 1,
                    "total_pages": 2
                }));
            })
            .await;
        let second = server
            .mock_async(|when, then| {
                when.method(GET).path("/manifests").query_param("page", "2");
                then.status(200).json_body(json!({
                    "items": [{"run": 5.0, "contract": "BEX", "date": "2025-06-21", "agent_fee": 7.25}],
                    "page": 2,
                    "total_pages": 2
                }));
            })
            .await;

        let from = NaiveDate::from_ymd_opt(2025, 6, 16);
        let fetch = fetch_fees(&settings(&server, &["5"]), from, None).await.unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(fetch.pages, 2);
        assert!(fetch.failures.is_empty());
        assert_eq!(fetch.fees.len(), 3);
        assert_eq!(fetch.fees[0].run, RawValue::Int(5));
        assert_eq!(fetch.fees[0].contract.as_deref(), Some("BEX"));
        assert_eq!(fetch.fees[1].contract, None);
        assert_eq!(fetch.fees[1].amount, RawValue::Text("12.50".into()));
        assert_eq!(fetch.fees[2].date, NaiveDate::from_ymd_opt(2025, 6, 21));
    }

    #[tokio::test]
    async fn test_failed_page_is_skipped() {
        let server = MockServer::start_async().await;
        mock_login(&server).await;

        for page in ["1", "3"] {
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/manifests").query_param("page", page);
                    then.status(200).json_body(json!({
                        "items": [{"run": 5, "date": "2025-06-20", "agent_fee": 10}],
                        "page": page.parse::<u32>().unwrap(),
                        "total_pages": 3
                    }));
                })
                .await;
        }
        server
            .mock_async(|when, then| {
                when.method(GET).path("/manifests").query_param("page", "2");
                then.status(500).body("upstream timeout");
            })
            .await;

        let fetch = fetch_fees(&settings(&server, &["5"]), None, None).await.unwrap();

        assert_eq!(fetch.pages, 2);
        assert_eq!(fetch.fees.len(), 2);
        assert_eq!(fetch.failures.len(), 1);
        assert_eq!(fetch.failures[0].page, 2);
        assert!(matches!(
            fetch.failures[0].error,
            PortalError::Status { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
    }

    #[tokio::test]
    async fn test_undecodable_first_page_abandons_run() {
        let server = MockServer::start_async().await;
        mock_login(&server).await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/manifests").query_param("run", "9");
                then.status(200).body("<html>maintenance</html>");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/manifests").query_param("run", "12");
                then.status(200).json_body(json!({
                    "items": [{"run": 12, "date": "2025-06-20", "agent_fee": 3}],
                    "page": 1,
                    "total_pages": 1
                }));
            })
            .await;

        let fetch = fetch_fees(&settings(&server, &["9", "12"]), None, None).await.unwrap();

        assert_eq!(fetch.failures.len(), 1);
        assert_eq!(fetch.failures[0].run, "9");
        assert!(matches!(fetch.failures[0].error, PortalError::Decode(_)));
        assert_eq!(fetch.fees.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_login_fails_source() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/auth/login");
                then.status(401).body("bad credentials");
            })
            .await;

        let result = fetch_fees(&settings(&server, &["5"]), None, None).await;
        assert!(matches!(result, Err(PortalError::Login(_))));
    }
}
