//! Configuration for the transfer manager
//!
//! Loaded from `rtm.toml`. A missing file is created from the bundled
//! template on first use. A handful of settings can be overridden from the
//! environment (or a `.env` file).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Semaphore;
use tracing::info;

use crate::error::{EngineError, Result};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Directory name under the user's config dir
pub const CONFIG_DIR_NAME: &str = "RucioTransferManager";

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "rtm.toml";

pub const DEFAULT_DB_URL: &str = "sqlite://rtm.db";
pub const DEFAULT_MAX_DASGOCLIENT: usize = 4;
pub const DEFAULT_MAX_XRDADLER32: usize = 10;
pub const DEFAULT_MIN_TIMELEFT: u64 = 1000;
pub const DEFAULT_RUCIO_HOST: &str = "https://cms-rucio.cern.ch";
pub const DEFAULT_RUCIO_AUTH_HOST: &str = "https://cms-rucio-auth.cern.ch";
pub const DEFAULT_RUCIO_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_CATALOG_COMMAND: &str = "dasgoclient";
pub const DEFAULT_CHECKSUM_COMMAND: &str = "xrdadler32";
pub const DEFAULT_URL_PREFIX: &str = "root://eospublic.cern.ch//eos/opendata/cms";
pub const DEFAULT_DATA_MARKER: &str = "Run2016";

/// Template written when no configuration file exists yet
pub const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../rtm.toml");

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// sqlx SQLite connection string
    pub db_url: String,

    /// Log every SQL statement
    pub db_echo: bool,

    /// Concurrent catalog queries
    pub max_dasgoclient: usize,

    /// Concurrent checksum computations
    pub max_xrdadler32: usize,

    #[serde(rename = "voms-proxy")]
    pub voms_proxy: VomsProxyConfig,

    #[serde(rename = "rucio-client")]
    pub rucio_client: RucioClientConfig,

    pub catalog: CatalogConfig,

    pub verify: VerifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VomsProxyConfig {
    /// Renew the proxy when fewer seconds than this remain
    pub min_timeleft: u64,

    /// Arguments passed to `voms-proxy-init`
    pub voms_proxy_args: Vec<String>,
}

/// How the Rucio client authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RucioAuthType {
    /// Grid proxy certificate
    #[default]
    X509,
    /// Username and password
    Userpass,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RucioClientConfig {
    pub rucio_host: String,
    pub auth_host: String,
    pub account: Option<String>,
    pub auth_type: RucioAuthType,
    pub username: Option<String>,
    pub password: Option<String>,

    /// Proxy certificate; defaults to `$X509_USER_PROXY` or `/tmp/x509up_u<uid>`
    pub client_proxy: Option<PathBuf>,

    /// CA bundle used to verify the Rucio servers
    pub ca_cert: Option<PathBuf>,

    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub command: String,

    /// Storage endpoint every retrieval URL starts with
    pub url_prefix: String,

    /// LFN substring selecting the collision-data URL layout
    pub data_marker: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: DEFAULT_DB_URL.to_string(),
            db_echo: false,
            max_dasgoclient: DEFAULT_MAX_DASGOCLIENT,
            max_xrdadler32: DEFAULT_MAX_XRDADLER32,
            voms_proxy: VomsProxyConfig::default(),
            rucio_client: RucioClientConfig::default(),
            catalog: CatalogConfig::default(),
            verify: VerifyConfig::default(),
        }
    }
}

impl Default for VomsProxyConfig {
    fn default() -> Self {
        Self {
            min_timeleft: DEFAULT_MIN_TIMELEFT,
            voms_proxy_args: ["-rfc", "-voms", "cms", "-valid", "96:0"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for RucioClientConfig {
    fn default() -> Self {
        Self {
            rucio_host: DEFAULT_RUCIO_HOST.to_string(),
            auth_host: DEFAULT_RUCIO_AUTH_HOST.to_string(),
            account: None,
            auth_type: RucioAuthType::default(),
            username: None,
            password: None,
            client_proxy: None,
            ca_cert: None,
            timeout_secs: DEFAULT_RUCIO_TIMEOUT_SECS,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_CATALOG_COMMAND.to_string(),
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_CHECKSUM_COMMAND.to_string(),
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
            data_marker: DEFAULT_DATA_MARKER.to_string(),
        }
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/RucioTransferManager/rtm.toml`, falling back to `~/.config`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Load the configuration, creating the file from the template if missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            install_template(path)?;
        }

        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&raw)?.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| EngineError::config(format!("invalid configuration: {}", e)))
    }

    /// Apply `RTM_DB_URL`, `RTM_MAX_DASGOCLIENT` and `RTM_MAX_XRDADLER32`
    pub fn with_env_overrides(mut self) -> Result<Self> {
        dotenvy::dotenv().ok();

        if let Ok(url) = std::env::var("RTM_DB_URL") {
            self.db_url = url;
        }

        if let Ok(value) = std::env::var("RTM_MAX_DASGOCLIENT") {
            self.max_dasgoclient = value
                .parse()
                .map_err(|_| EngineError::config(format!("RTM_MAX_DASGOCLIENT is not a number: {}", value)))?;
        }

        if let Ok(value) = std::env::var("RTM_MAX_XRDADLER32") {
            self.max_xrdadler32 = value
                .parse()
                .map_err(|_| EngineError::config(format!("RTM_MAX_XRDADLER32 is not a number: {}", value)))?;
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.db_url.is_empty() {
            return Err(EngineError::config("db_url cannot be empty"));
        }

        for (key, value) in [
            ("max_dasgoclient", self.max_dasgoclient),
            ("max_xrdadler32", self.max_xrdadler32),
        ] {
            if value == 0 {
                return Err(EngineError::config(format!("{} must be greater than 0", key)));
            }
            if value > Semaphore::MAX_PERMITS {
                return Err(EngineError::config(format!(
                    "{} must be at most {}",
                    key,
                    Semaphore::MAX_PERMITS
                )));
            }
        }

        if self.rucio_client.auth_type == RucioAuthType::Userpass
            && (self.rucio_client.username.is_none() || self.rucio_client.password.is_none())
        {
            return Err(EngineError::config(
                "rucio-client.auth_type = \"userpass\" needs username and password",
            ));
        }

        Ok(())
    }
}

fn install_template(path: &Path) -> Result<()> {
    info!(path = %path.display(), "Creating configuration file");

    if let Some(parent) = path.parent() {
        create_private_dir(parent)?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
    Ok(())
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    std::fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}
