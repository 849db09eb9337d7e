//! HTTP primitives of the Keon OAuth servers

use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

pub const PARTNER_ACCESS_PATH: &str = "/api/token/partner/access";
pub const VALIDATION_PATH: &str = "/api/token/validation";
pub const REGISTRATION_PATH: &str = "/api/token/registration";

/// Upper bound for one whole request against an OAuth server
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("OAuth server URL is empty")]
    MissingBaseUrl,
    #[error("status: {status}. text: {text}")]
    Status { status: StatusCode, text: String },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid JSON body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Tokens returned by the partner access endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct AccessTokens {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(serde::Deserialize)]
struct RegistrationResponse {
    registration_token: Option<String>,
}

/// The three calls the Keon SDK makes against an OAuth server
#[async_trait::async_trait]
pub trait OauthApi: Send + Sync {
    /// Exchange the partner credential for an access/refresh token pair.
    /// A response without tokens yields an empty [`AccessTokens`].
    async fn fetch_access_token(
        &self,
        server: &str,
        credential: &str,
        device_connection_key: Option<&str>,
    ) -> Result<AccessTokens, ApiError>;

    /// Time a validation round trip of `access_token` against `server`
    async fn token_validation_time(
        &self,
        server: &str,
        access_token: &str,
    ) -> Result<Duration, ApiError>;

    /// Exchange an access token for a registration token
    async fn fetch_registration_token(
        &self,
        server: &str,
        access_token: &str,
    ) -> Result<Option<String>, ApiError>;
}

#[async_trait::async_trait]
impl<T: OauthApi + ?Sized> OauthApi for &T {
    async fn fetch_access_token(
        &self,
        server: &str,
        credential: &str,
        device_connection_key: Option<&str>,
    ) -> Result<AccessTokens, ApiError> {
        (**self)
            .fetch_access_token(server, credential, device_connection_key)
            .await
    }

    async fn token_validation_time(
        &self,
        server: &str,
        access_token: &str,
    ) -> Result<Duration, ApiError> {
        (**self).token_validation_time(server, access_token).await
    }

    async fn fetch_registration_token(
        &self,
        server: &str,
        access_token: &str,
    ) -> Result<Option<String>, ApiError> {
        (**self).fetch_registration_token(server, access_token).await
    }
}

/// [`OauthApi`] over HTTPS
#[derive(Debug, Clone)]
pub struct HttpOauthApi {
    client: reqwest::Client,
}

impl HttpOauthApi {
    /// Client bounded by [`DEFAULT_REQUEST_TIMEOUT`]
    pub fn new() -> Result<Self, ApiError> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Send an authenticated request; any non-2xx status is an error
    async fn send(
        &self,
        method: Method,
        base_url: &str,
        path: &str,
        bearer: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, ApiError> {
        if base_url.is_empty() {
            error!(path, "base url not found");
            return Err(ApiError::MissingBaseUrl);
        }

        let url = format!("{}{path}", base_url.trim_end_matches('/'));
        debug!(%method, %url, "oauth request");

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(bearer)
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, text });
        }
        Ok(response)
    }

    /// JSON body of a successful response; 204 or a missing content type
    /// mean there is no body
    async fn json_body<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Option<T>, ApiError> {
        if response.status() == StatusCode::NO_CONTENT
            || !response.headers().contains_key(CONTENT_TYPE)
        {
            return Ok(None);
        }
        let bytes = response.bytes().await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

#[async_trait::async_trait]
impl OauthApi for HttpOauthApi {
    async fn fetch_access_token(
        &self,
        server: &str,
        credential: &str,
        device_connection_key: Option<&str>,
    ) -> Result<AccessTokens, ApiError> {
        let body = device_connection_key
            .filter(|key| !key.is_empty())
            .map(|key| serde_json::json!({ "device_connection_key": key }));
        let response = self
            .send(Method::POST, server, PARTNER_ACCESS_PATH, credential, body)
            .await?;
        Ok(Self::json_body(response).await?.unwrap_or_default())
    }

    async fn token_validation_time(
        &self,
        server: &str,
        access_token: &str,
    ) -> Result<Duration, ApiError> {
        let start = Instant::now();
        let response = self
            .send(Method::POST, server, VALIDATION_PATH, access_token, None)
            .await?;
        response.bytes().await?;
        Ok(start.elapsed())
    }

    async fn fetch_registration_token(
        &self,
        server: &str,
        access_token: &str,
    ) -> Result<Option<String>, ApiError> {
        let response = self
            .send(Method::POST, server, REGISTRATION_PATH, access_token, None)
            .await?;
        let body: Option<RegistrationResponse> = Self::json_body(response).await?;
        Ok(body.and_then(|b| b.registration_token))
    }
}
