pub const US_SERVER: &str = "https://oauth-us.feelme.com";
pub const EU_SERVER: &str = "https://oauth-eu.feelme.com";
pub const AUS_SERVER: &str = "https://oauth-aus.feelme.com";

/// Built-in regional servers, in tie-break order
pub const DEFAULT_SERVERS: [&str; 3] = [US_SERVER, EU_SERVER, AUS_SERVER];

/// Environment variable naming one extra OAuth server
pub const OAUTH_SERVER_ENV: &str = "KEON_OAUTH_SERVER_API_URL";

/// Ordered list of OAuth servers tried by a selection round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerList {
    servers: Vec<String>,
}

impl Default for ServerList {
    fn default() -> Self {
        Self {
            servers: DEFAULT_SERVERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ServerList {
    /// Built-in servers followed by `extra`, if it is set and non-empty
    pub fn with_extra(extra: Option<&str>) -> Self {
        let mut list = Self::default();
        if let Some(extra) = extra.map(str::trim).filter(|s| !s.is_empty()) {
            list.servers.push(extra.to_string());
        }
        list
    }

    /// Built-in servers plus the one named by `KEON_OAUTH_SERVER_API_URL`
    pub fn from_env() -> Self {
        let extra = std::env::var(OAUTH_SERVER_ENV).ok();
        tracing::debug!(extra = ?extra, "oauth server list");
        Self::with_extra(extra.as_deref())
    }

    /// An explicit list, for tests and private deployments
    pub fn custom<I, S>(servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            servers: servers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.servers.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}
