//! Registration tokens and the credential pipelines built on them

use tracing::{error, info, warn};

use crate::{
    ApiError, OauthApi, RegistrationToken, ServerList, ServerSelector, TokenError, TokenPayload,
    display_token,
};

/// Exchanges an access token for a registration token
pub struct RegistrationTokenIssuer<A> {
    api: A,
}

impl<A: OauthApi> RegistrationTokenIssuer<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    /// One fresh exchange against `server`. Missing input, request failures
    /// and responses without a token are logged and yield `None`.
    pub async fn exchange(&self, server: &str, access_token: &str) -> Option<RegistrationToken> {
        if access_token.is_empty() {
            error!("fetch_registration_token: access token is missing");
            return None;
        }

        match self.api.fetch_registration_token(server, access_token).await {
            Ok(Some(token)) if !token.is_empty() => {
                info!(server, token = %display_token(&token), "registration token issued");
                Some(RegistrationToken::new(token))
            }
            Ok(_) => {
                warn!(server, "response carried no registration token");
                None
            }
            Err(e) => {
                error!(server, "registration token exchange failed: {e}");
                None
            }
        }
    }
}

/// What a device needs to be provisioned
#[derive(Debug, Clone)]
pub struct WifiTokens {
    pub registration_token: RegistrationToken,
    /// Device connection key carried by the winning access token
    pub device_connection_key: Option<String>,
}

/// Best server, then registration token.
///
/// `None` if no server validated or the exchange produced no token.
pub async fn token_for_keon_wifi<A: OauthApi>(
    api: &A,
    servers: &ServerList,
    credential: &str,
    device_connection_key: Option<&str>,
) -> Option<WifiTokens> {
    let selection = ServerSelector::new(api, servers.clone())
        .choose_best_server(credential, device_connection_key)
        .await;
    let best = selection.best?;

    let registration_token = RegistrationTokenIssuer::new(api)
        .exchange(&best.url, &best.access_token)
        .await?;
    let device_connection_key = TokenPayload::decode(&best.access_token)
        .ok()
        .and_then(|p| p.device_connection_key);

    Some(WifiTokens {
        registration_token,
        device_connection_key,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("registration token cannot be decoded: {0}")]
    Token(#[from] TokenError),
    #[error("registration token has no {0}")]
    MissingRouting(&'static str),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("OAuth server returned no access token")]
    MissingAccessToken,
}

/// Where and how to open the real-time control channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCredentials {
    pub socket_server_url: String,
    pub access_token: String,
}

/// Fetch an access token for the control channel from the OAuth server
/// named in the registration token
pub async fn credential_for_control_server<A: OauthApi>(
    api: &A,
    credential: &str,
    registration_token: &RegistrationToken,
) -> Result<ControlCredentials, CredentialError> {
    let payload = registration_token.payload()?;
    let routing = registration_token.routing()?;

    let oauth_server = routing
        .oauth_server_url
        .ok_or(CredentialError::MissingRouting("oauth_server_url"))?;
    let socket_server_url = routing
        .wss_cc_server_url
        .ok_or(CredentialError::MissingRouting("wss_cc_server_url"))?;

    let tokens = api
        .fetch_access_token(
            &oauth_server,
            credential,
            payload.device_connection_key.as_deref(),
        )
        .await?;
    let access_token = tokens
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or(CredentialError::MissingAccessToken)?;

    Ok(ControlCredentials {
        socket_server_url,
        access_token,
    })
}
