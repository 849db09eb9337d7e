use std::path::{Path, PathBuf};
use std::time::Duration;

use keon_ble_controller::ProvisionOptions;
use keon_oauth::{OAUTH_SERVER_ENV, ServerList};
use keon_proto::ble::DEFAULT_MTU_SIZE;

pub const HOME_ENV: &str = "KEON_HOME";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot determine home directory, set {HOME_ENV}")]
    NoHome,
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config encode error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config {path} is not valid: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Settings kept in `config.json` under the Keon home directory
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct KeonConfig {
    /// Extra OAuth server raced against the regional ones
    pub oauth_server_api_url: Option<String>,
    pub mtu: usize,
    pub gatt_timeout_secs: u64,
    pub scan_secs: u64,
    pub log_level: String,
}

impl Default for KeonConfig {
    fn default() -> Self {
        Self {
            oauth_server_api_url: None,
            mtu: DEFAULT_MTU_SIZE,
            gatt_timeout_secs: 10,
            scan_secs: 5,
            log_level: "info".to_string(),
        }
    }
}

impl KeonConfig {
    /// Read `home/config.json`, writing the defaults there when it is missing.
    /// A file that does not parse is left alone and reported as
    /// [`ConfigError::Invalid`].
    pub fn load(home: &Path) -> Result<Self, ConfigError> {
        let path = home.join("config.json");
        if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            serde_json::from_str(&data).map_err(|source| ConfigError::Invalid { path, source })
        } else {
            let config = Self::default();
            std::fs::create_dir_all(home)?;
            std::fs::write(&path, serde_json::to_string_pretty(&config)?)?;
            Ok(config)
        }
    }

    /// `KEON_OAUTH_SERVER_API_URL` wins over the configured extra server
    pub fn servers(&self) -> ServerList {
        let from_env = std::env::var(OAUTH_SERVER_ENV).ok();
        self.servers_with(from_env.as_deref())
    }

    fn servers_with(&self, env_override: Option<&str>) -> ServerList {
        let extra = env_override
            .filter(|s| !s.trim().is_empty())
            .or(self.oauth_server_api_url.as_deref());
        ServerList::with_extra(extra)
    }

    pub fn provision_options(&self) -> ProvisionOptions {
        ProvisionOptions {
            timeout: Duration::from_secs(self.gatt_timeout_secs),
            mtu: Some(self.mtu),
        }
    }
}

/// `$KEON_HOME`, else `~/.keon`
pub fn keon_home() -> Result<PathBuf, ConfigError> {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|home| home.join(".keon"))
        .ok_or(ConfigError::NoHome)
}
