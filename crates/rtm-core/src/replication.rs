//! Replication service client
//!
//! [`ReplicationClient`] is the engine's view of Rucio: create a rule, poll
//! it, list existing rules and ask who we are. [`RucioClient`] implements it
//! over the Rucio REST API.
//!
//! Authentication happens lazily on the first request. The returned
//! `X-Rucio-Auth-Token` is cached and reused until the server answers
//! `401`, at which point it is fetched again once.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::config::{RucioAuthType, RucioClientConfig};
use crate::error::{EngineError, Result};
use crate::models::LockCounts;

/// DID scope of every dataset handled by the manager
pub const RUCIO_SCOPE: &str = "cms";

/// Rule state meaning every replica lock is satisfied
pub const RULE_STATE_OK: &str = "OK";

const AUTH_TOKEN_HEADER: &str = "X-Rucio-Auth-Token";
const ACCOUNT_HEADER: &str = "X-Rucio-Account";
const EXCEPTION_HEADER: &str = "X-Rucio-Exception";

/// Current state of a replication rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleStatus {
    pub state: String,
    pub locks: LockCounts,
}

impl RuleStatus {
    pub fn is_ok(&self) -> bool {
        self.state == RULE_STATE_OK
    }
}

/// A replication rule as listed by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationRule {
    pub id: String,
    pub state: String,
    pub locks: LockCounts,
}

/// Filter for [`ReplicationClient::list_rules`]
#[derive(Debug, Clone, Serialize)]
pub struct RuleFilter {
    pub scope: String,
    pub name: String,
    pub rse_expression: String,
}

impl RuleFilter {
    /// Rules for `dataset` in the default scope targeting `site`
    pub fn for_dataset(dataset: &str, site: &str) -> Self {
        Self {
            scope: RUCIO_SCOPE.to_string(),
            name: dataset.to_string(),
            rse_expression: site.to_string(),
        }
    }
}

#[async_trait]
pub trait ReplicationClient: Send + Sync {
    /// Create a one-copy rule for `dataset` at `site` and return its id
    async fn create_rule(&self, dataset: &str, site: &str) -> Result<String>;

    async fn query_rule(&self, rule_id: &str) -> Result<RuleStatus>;

    async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<ReplicationRule>>;

    /// Account name the client is authenticated as
    async fn whoami(&self) -> Result<String>;
}

/// Wire form of a rule returned by `GET /rules/...`
#[derive(Debug, Deserialize)]
struct RuleRecord {
    #[serde(default)]
    id: String,
    state: String,
    #[serde(default)]
    locks_ok_cnt: u64,
    #[serde(default)]
    locks_replicating_cnt: u64,
    #[serde(default)]
    locks_stuck_cnt: u64,
}

impl RuleRecord {
    fn locks(&self) -> LockCounts {
        LockCounts {
            ok: self.locks_ok_cnt,
            replicating: self.locks_replicating_cnt,
            stuck: self.locks_stuck_cnt,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WhoAmI {
    account: String,
}

#[derive(Debug, Clone)]
enum Credentials {
    Userpass { username: String, password: String },
    X509,
}

/// Rucio REST client
///
/// The HTTP client, and with it the proxy certificate, is only loaded on the
/// first request.
pub struct RucioClient {
    config: RucioClientConfig,
    rucio_host: String,
    auth_host: String,
    credentials: Credentials,
    http: OnceCell<Client>,
    token: Mutex<Option<String>>,
}

impl RucioClient {
    pub fn new(config: &RucioClientConfig) -> Result<Self> {
        let credentials = match config.auth_type {
            RucioAuthType::Userpass => Credentials::Userpass {
                username: config
                    .username
                    .clone()
                    .ok_or_else(|| EngineError::config("rucio-client.username is required for userpass"))?,
                password: config
                    .password
                    .clone()
                    .ok_or_else(|| EngineError::config("rucio-client.password is required for userpass"))?,
            },
            RucioAuthType::X509 => Credentials::X509,
        };

        Ok(Self {
            config: config.clone(),
            rucio_host: config.rucio_host.trim_end_matches('/').to_string(),
            auth_host: config.auth_host.trim_end_matches('/').to_string(),
            credentials,
            http: OnceCell::new(),
            token: Mutex::new(None),
        })
    }

    async fn http(&self) -> Result<&Client> {
        self.http
            .get_or_try_init(|| async { build_http_client(&self.config, &self.credentials) })
            .await
    }

    async fn authenticate(&self) -> Result<String> {
        let http = self.http().await?;
        let (path, request) = match &self.credentials {
            Credentials::Userpass { username, password } => (
                "/auth/userpass",
                http.get(format!("{}/auth/userpass", self.auth_host))
                    .header("X-Rucio-Username", username)
                    .header("X-Rucio-Password", password),
            ),
            Credentials::X509 => ("/auth/x509", http.get(format!("{}/auth/x509", self.auth_host))),
        };

        let request = match &self.config.account {
            Some(account) => request.header(ACCOUNT_HEADER, account),
            None => request,
        };

        let response = request.send().await.map_err(transport_error)?;
        let response = check_status(response, path).await.map_err(|e| match e {
            EngineError::Replication(reason) => EngineError::unavailable(reason),
            other => other,
        })?;

        let token = response
            .headers()
            .get(AUTH_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| EngineError::unavailable("authentication response carried no token"))?
            .to_string();

        info!(auth_host = %self.auth_host, "Authenticated with Rucio");
        Ok(token)
    }

    async fn token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = self.authenticate().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Send an authenticated request, re-authenticating once on `401`
    async fn send(&self, build: impl Fn(&Client) -> RequestBuilder) -> Result<Response> {
        let http = self.http().await?;
        let token = self.token().await?;
        let response = build(http)
            .header(AUTH_TOKEN_HEADER, &token)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("Rucio token rejected, re-authenticating");
        *self.token.lock().await = None;
        let token = self.token().await?;
        build(http)
            .header(AUTH_TOKEN_HEADER, &token)
            .send()
            .await
            .map_err(transport_error)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.rucio_host, path)
    }
}

#[async_trait]
impl ReplicationClient for RucioClient {
    async fn create_rule(&self, dataset: &str, site: &str) -> Result<String> {
        let body = json!({
            "dids": [{"scope": RUCIO_SCOPE, "name": dataset}],
            "copies": 1,
            "rse_expression": site,
        });

        let response = self
            .send(|http| http.post(self.url("/rules/")).json(&body))
            .await?;

        let response = check_status(response, "/rules/").await.map_err(|e| match e {
            EngineError::Replication(reason) => EngineError::rejected(dataset, reason),
            other => other,
        })?;

        let ids: Vec<String> = response
            .json()
            .await
            .map_err(|e| EngineError::rejected(dataset, format!("unexpected response: {}", e)))?;

        ids.into_iter()
            .next()
            .ok_or_else(|| EngineError::rejected(dataset, "service returned no rule id"))
    }

    async fn query_rule(&self, rule_id: &str) -> Result<RuleStatus> {
        let path = format!("/rules/{}", rule_id);
        let response = self.send(|http| http.get(self.url(&path))).await?;
        let response = check_status(response, &path).await?;

        let record: RuleRecord = response
            .json()
            .await
            .map_err(|e| EngineError::replication(format!("unexpected rule response: {}", e)))?;

        Ok(RuleStatus {
            locks: record.locks(),
            state: record.state,
        })
    }

    async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<ReplicationRule>> {
        let response = self
            .send(|http| http.get(self.url("/rules/")).query(filter))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let response = check_status(response, "/rules/").await?;
        let body = response.text().await.map_err(transport_error)?;

        parse_rule_lines(&body)
    }

    async fn whoami(&self) -> Result<String> {
        let response = self
            .send(|http| http.get(self.url("/accounts/whoami")))
            .await?;
        let response = check_status(response, "/accounts/whoami").await?;

        let who: WhoAmI = response
            .json()
            .await
            .map_err(|e| EngineError::replication(format!("unexpected whoami response: {}", e)))?;
        Ok(who.account)
    }
}

fn build_http_client(config: &RucioClientConfig, credentials: &Credentials) -> Result<Client> {
    let mut builder = Client::builder()
        .use_rustls_tls()
        .timeout(Duration::from_secs(config.timeout_secs));

    if let Some(ca) = &config.ca_cert {
        for pem in read_ca_bundle(ca)? {
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                EngineError::config(format!("invalid CA certificate in {}: {}", ca.display(), e))
            })?;
            builder = builder.add_root_certificate(cert);
        }
    }

    if let Credentials::X509 = credentials {
        let proxy = config
            .client_proxy
            .clone()
            .or_else(default_proxy_path)
            .ok_or_else(|| EngineError::config("no proxy certificate configured"))?;
        let pem = std::fs::read(&proxy).map_err(|e| {
            EngineError::config(format!("cannot read proxy certificate {}: {}", proxy.display(), e))
        })?;
        let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
            EngineError::config(format!("invalid proxy certificate {}: {}", proxy.display(), e))
        })?;
        builder = builder.identity(identity);
    }

    builder
        .build()
        .map_err(|e| EngineError::config(format!("failed to build HTTP client: {}", e)))
}

/// Parse the newline-delimited JSON returned by rule listings
fn parse_rule_lines(body: &str) -> Result<Vec<ReplicationRule>> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let record: RuleRecord = serde_json::from_str(line)
                .map_err(|e| EngineError::replication(format!("unexpected rule listing: {}", e)))?;
            Ok(ReplicationRule {
                locks: record.locks(),
                id: record.id,
                state: record.state,
            })
        })
        .collect()
}

fn transport_error(e: reqwest::Error) -> EngineError {
    EngineError::unavailable(e.to_string())
}

/// Turn a non-success response into an error carrying Rucio's exception text
///
/// A `401` that survives re-authentication means the credentials themselves
/// are refused, which is [`EngineError::ReplicationUnavailable`].
async fn check_status(response: Response, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let exception = response
        .headers()
        .get(EXCEPTION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("ExceptionMessage").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or(body);

    let reason = match exception {
        Some(class) => format!("{} {}: {}: {}", status, path, class, message.trim()),
        None => format!("{} {}: {}", status, path, message.trim()),
    };

    if status == StatusCode::UNAUTHORIZED {
        Err(EngineError::unavailable(reason))
    } else {
        Err(EngineError::replication(reason))
    }
}

/// `$X509_USER_PROXY`, else `/tmp/x509up_u<uid>`
fn default_proxy_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("X509_USER_PROXY") {
        return Some(PathBuf::from(path));
    }
    current_uid().map(|uid| PathBuf::from(format!("/tmp/x509up_u{}", uid)))
}

#[cfg(unix)]
fn current_uid() -> Option<u32> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata("/proc/self").ok().map(|m| m.uid())
}

#[cfg(not(unix))]
fn current_uid() -> Option<u32> {
    None
}

/// PEM blobs from a CA file, or from every `.pem` file in a CA directory
fn read_ca_bundle(path: &Path) -> Result<Vec<Vec<u8>>> {
    if !path.is_dir() {
        return Ok(vec![std::fs::read(path)?]);
    }

    let mut bundle = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?.path();
        if entry.extension().is_some_and(|ext| ext == "pem") {
            bundle.push(std::fs::read(&entry)?);
        }
    }
    Ok(bundle)
}
