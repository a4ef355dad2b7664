//! Pi-hole API client
//!
//! [`PiHoleApi`] is the seam the config flow and the coordinator talk to.
//! [`HoleV6`] implements it against the Pi-hole v6 REST API:
//!
//! ```text
//! POST {scheme}://{host}/api/auth          {"password": ...} -> {"session": {"valid", "sid"}}
//! GET  {scheme}://{host}/api/stats/summary X-FTL-SID: <sid>  -> summary record | 401
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::ConnectionConfig;

const SESSION_HEADER: &str = "X-FTL-SID";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Failures talking to a Pi-hole
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HoleError {
    /// Unreachable, timed out, TLS handshake failed
    #[error("connection failed: {0}")]
    Connection(String),

    /// The Pi-hole answered with something other than data or an auth challenge
    #[error("API error: {0}")]
    Api(String),
}

/// What a data fetch produced
#[derive(Debug, Clone, PartialEq)]
pub enum DataResponse {
    Record(Summary),
    /// The Pi-hole answered but wants (different) credentials
    AuthRequired,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryStats {
    pub total: u64,
    pub blocked: u64,
    pub percent_blocked: f64,
    pub unique_domains: u64,
    pub forwarded: u64,
    pub cached: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientStats {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GravityStats {
    pub domains_being_blocked: u64,
    pub last_update: i64,
}

/// `/api/stats/summary` record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Summary {
    pub queries: QueryStats,
    pub clients: ClientStats,
    pub gravity: GravityStats,
}

impl Summary {
    /// Look up a statistic by its sensor key
    pub fn get(&self, key: &str) -> Option<Value> {
        let value: Value = match key {
            "ads_blocked_today" => self.queries.blocked.into(),
            "ads_percentage_today" => self.queries.percent_blocked.into(),
            "clients_ever_seen" => self.clients.total.into(),
            "dns_queries_today" => self.queries.total.into(),
            "domains_being_blocked" => self.gravity.domains_being_blocked.into(),
            "queries_cached" => self.queries.cached.into(),
            "queries_forwarded" => self.queries.forwarded.into(),
            "unique_clients" => self.clients.active.into(),
            "unique_domains" => self.queries.unique_domains.into(),
            _ => return None,
        };
        Some(value)
    }
}

/// A handle on one Pi-hole
#[async_trait]
pub trait PiHoleApi: Send + Sync {
    /// URL of the admin interface, for logs and display
    fn base_url(&self) -> String;

    /// Fetch the statistics summary
    async fn get_data(&self) -> Result<DataResponse, HoleError>;
}

/// Arguments for building a client
#[derive(Clone, PartialEq, Eq)]
pub struct HoleParams {
    pub host: String,
    pub location: String,
    pub use_tls: bool,
    pub verify_tls: bool,
    pub password: Option<String>,
}

impl From<&ConnectionConfig> for HoleParams {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            host: config.host.clone(),
            location: config.location.clone(),
            use_tls: config.use_tls,
            verify_tls: config.verify_tls,
            password: config.api_key.clone(),
        }
    }
}

/// Builds API clients
///
/// Lets callers swap the HTTP client for a fake.
pub trait ApiFactory: Send + Sync {
    fn create(&self, params: HoleParams) -> Result<Arc<dyn PiHoleApi>, HoleError>;
}

/// Shared HTTP clients, one per certificate-verification mode
#[derive(Debug, Default)]
pub struct ClientSessions {
    verified: OnceLock<reqwest::Client>,
    unverified: OnceLock<reqwest::Client>,
}

impl ClientSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, verify_tls: bool) -> Result<reqwest::Client, HoleError> {
        let slot = if verify_tls {
            &self.verified
        } else {
            &self.unverified
        };
        if let Some(client) = slot.get() {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| HoleError::Connection(e.to_string()))?;
        Ok(slot.get_or_init(|| client).clone())
    }
}

/// [`ApiFactory`] producing [`HoleV6`] clients
#[derive(Debug, Default)]
pub struct HoleV6Factory {
    sessions: ClientSessions,
}

impl HoleV6Factory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApiFactory for HoleV6Factory {
    fn create(&self, params: HoleParams) -> Result<Arc<dyn PiHoleApi>, HoleError> {
        let client = self.sessions.get(params.verify_tls)?;
        Ok(Arc::new(HoleV6::new(client, params)))
    }
}

#[derive(Deserialize)]
struct AuthResponse {
    session: Session,
}

#[derive(Deserialize)]
struct Session {
    valid: bool,
    sid: Option<String>,
}

enum Login {
    Session(String),
    /// Pi-hole runs without a password
    Open,
    Rejected,
}

/// Pi-hole v6 REST client
pub struct HoleV6 {
    client: reqwest::Client,
    params: HoleParams,
    sid: Mutex<Option<String>>,
}

impl HoleV6 {
    pub fn new(client: reqwest::Client, params: HoleParams) -> Self {
        Self {
            client,
            params,
            sid: Mutex::new(None),
        }
    }

    fn scheme(&self) -> &'static str {
        if self.params.use_tls {
            "https"
        } else {
            "http"
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}://{}/api/{}", self.scheme(), self.params.host, path)
    }

    fn connection_error(&self, err: reqwest::Error) -> HoleError {
        HoleError::Connection(format!("{}: {}", self.params.host, err))
    }

    async fn login(&self, password: &str) -> Result<Login, HoleError> {
        let response = self
            .client
            .post(self.api_url("auth"))
            .json(&serde_json::json!({ "password": password }))
            .send()
            .await
            .map_err(|e| self.connection_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(Login::Rejected);
        }
        if !status.is_success() {
            return Err(HoleError::Api(format!("auth returned HTTP {status}")));
        }

        let auth: AuthResponse = response
            .json()
            .await
            .map_err(|e| HoleError::Api(format!("malformed auth response: {e}")))?;

        Ok(match (auth.session.valid, auth.session.sid) {
            (true, Some(sid)) => Login::Session(sid),
            (true, None) => Login::Open,
            (false, _) => Login::Rejected,
        })
    }

    async fn fetch_summary(&self, sid: Option<&str>) -> Result<DataResponse, HoleError> {
        let mut request = self.client.get(self.api_url("stats/summary"));
        if let Some(sid) = sid {
            request = request.header(SESSION_HEADER, sid);
        }

        let response = request.send().await.map_err(|e| self.connection_error(e))?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Ok(DataResponse::AuthRequired);
        }
        if !status.is_success() {
            return Err(HoleError::Api(format!("summary returned HTTP {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| HoleError::Api(format!("malformed summary: {e}")))?;

        // Anything but a JSON object is treated as an authentication challenge
        if !body.is_object() {
            debug!("Summary is not a record");
            return Ok(DataResponse::AuthRequired);
        }

        serde_json::from_value(body)
            .map(DataResponse::Record)
            .map_err(|e| HoleError::Api(format!("unexpected summary shape: {e}")))
    }
}

#[async_trait]
impl PiHoleApi for HoleV6 {
    fn base_url(&self) -> String {
        format!(
            "{}://{}/{}",
            self.scheme(),
            self.params.host,
            self.params.location
        )
    }

    async fn get_data(&self) -> Result<DataResponse, HoleError> {
        let cached = self.sid.lock().await.clone();
        if let Some(sid) = cached {
            match self.fetch_summary(Some(&sid)).await? {
                DataResponse::AuthRequired => {
                    debug!("Pi-hole session expired, logging in again");
                    *self.sid.lock().await = None;
                }
                record => return Ok(record),
            }
        }

        let sid = match self.params.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => match self.login(password).await? {
                Login::Session(sid) => Some(sid),
                Login::Open => None,
                Login::Rejected => return Ok(DataResponse::AuthRequired),
            },
            None => None,
        };

        let response = self.fetch_summary(sid.as_deref()).await?;
        if let (DataResponse::Record(_), Some(sid)) = (&response, sid) {
            *self.sid.lock().await = Some(sid);
        }
        Ok(response)
    }
}
