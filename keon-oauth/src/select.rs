//! Best-server selection across the regional OAuth servers

use std::time::Duration;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::{OauthApi, ServerList, display_token};

/// The server whose access token validated fastest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestServer {
    pub url: String,
    pub access_token: String,
    pub latency: Duration,
}

/// Outcome of one selection round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub best: Option<BestServer>,
    /// Every server whose fetch succeeded, in list order, with the access
    /// token it returned (empty when the response carried none)
    pub tokens: Vec<(String, String)>,
}

impl Selection {
    /// `(best server url, best access token)`, both `None` when no server
    /// validated
    pub fn into_pair(self) -> (Option<String>, Option<String>) {
        match self.best {
            Some(best) => (Some(best.url), Some(best.access_token)),
            None => (None, None),
        }
    }
}

pub struct ServerSelector<A> {
    api: A,
    servers: ServerList,
}

impl<A: OauthApi> ServerSelector<A> {
    pub fn new(api: A, servers: ServerList) -> Self {
        Self { api, servers }
    }

    pub fn servers(&self) -> &ServerList {
        &self.servers
    }

    /// Pick the server that validates a freshly fetched access token in the
    /// least time.
    ///
    /// All fetches run concurrently and a failing server only drops out of
    /// the round. Validations then run one at a time in list order; a
    /// strictly smaller latency is needed to displace the current best, so
    /// ties go to the server listed first. Never fails: a round where
    /// nothing validates returns no best server.
    pub async fn choose_best_server(
        &self,
        credential: &str,
        device_connection_key: Option<&str>,
    ) -> Selection {
        if credential.is_empty() {
            error!("choose_best_server: access credential is missing");
            return Selection::default();
        }

        let fetches = self.servers.iter().map(|server| async move {
            let result = self
                .api
                .fetch_access_token(server, credential, device_connection_key)
                .await;
            (server, result)
        });

        let mut tokens = Vec::with_capacity(self.servers.len());
        for (server, result) in join_all(fetches).await {
            match result {
                Ok(fetched) => {
                    tokens.push((server.to_string(), fetched.access_token.unwrap_or_default()))
                }
                Err(e) => warn!(server, "failed to fetch access token: {e}"),
            }
        }

        let mut best: Option<BestServer> = None;
        for (server, token) in tokens.iter().filter(|(_, token)| !token.is_empty()) {
            match self.api.token_validation_time(server, token).await {
                Ok(latency) => {
                    info!(server = server.as_str(), ?latency, "token validated");
                    if best.as_ref().is_none_or(|b| latency < b.latency) {
                        best = Some(BestServer {
                            url: server.clone(),
                            access_token: token.clone(),
                            latency,
                        });
                    }
                }
                Err(e) => warn!(server = server.as_str(), "failed to validate token: {e}"),
            }
        }

        match &best {
            Some(b) => info!(
                server = b.url.as_str(),
                token = %display_token(&b.access_token),
                latency = ?b.latency,
                "best server chosen"
            ),
            None => warn!("no OAuth server validated a token"),
        }

        Selection { best, tokens }
    }
}
