//! Read-only views over the JWTs issued by the OAuth servers

use std::time::{SystemTime, UNIX_EPOCH};

use data_encoding::BASE64URL_NOPAD;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is not a JWT")]
    Malformed,
    #[error("token payload is not base64url: {0}")]
    Base64(#[from] data_encoding::DecodeError),
    #[error("token payload is not JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Claims shared by access and registration tokens
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct TokenPayload {
    /// NumericDate, seconds; may be fractional
    #[serde(default)]
    pub exp: Option<f64>,
    #[serde(default)]
    pub iat: Option<f64>,
    #[serde(default)]
    pub user_id: Option<serde_json::Value>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub original_token_type: Option<String>,
    #[serde(default)]
    pub device_connection_key: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl TokenPayload {
    /// Decode the payload segment of `token` without verifying its signature
    pub fn decode(token: &str) -> Result<Self, TokenError> {
        let mut parts = token.split('.');
        let payload = match (parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(payload), Some(_)) if !payload.is_empty() => payload,
            _ => return Err(TokenError::Malformed),
        };
        let bytes = BASE64URL_NOPAD.decode(payload.trim_end_matches('=').as_bytes())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Routing data embedded in a registration token
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct RegistrationTokenData {
    #[serde(default)]
    pub oauth_server_url: Option<String>,
    #[serde(default)]
    pub wss_cc_server_url: Option<String>,
    #[serde(default)]
    pub exchange_endpoint: Option<String>,
    #[serde(default)]
    pub refresh_endpoint: Option<String>,
}

/// Signed registration token; never modified, only decoded
#[derive(Clone, PartialEq, Eq)]
pub struct RegistrationToken(String);

impl RegistrationToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn payload(&self) -> Result<TokenPayload, TokenError> {
        TokenPayload::decode(&self.0)
    }

    pub fn routing(&self) -> Result<RegistrationTokenData, TokenError> {
        match self.payload()?.data {
            Some(data) => Ok(serde_json::from_value(data)?),
            None => Ok(RegistrationTokenData::default()),
        }
    }

    pub fn oauth_server_url(&self) -> Option<String> {
        self.routing().ok()?.oauth_server_url
    }

    pub fn socket_server_url(&self) -> Option<String> {
        self.routing().ok()?.wss_cc_server_url
    }

    pub fn device_connection_key(&self) -> Option<String> {
        self.payload().ok()?.device_connection_key
    }
}

impl std::fmt::Debug for RegistrationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RegistrationToken")
            .field(&display_token(&self.0))
            .finish()
    }
}

/// Whether `token` is still in the first half of its lifetime
pub fn is_token_valid(token: &str) -> bool {
    is_token_valid_at(token, SystemTime::now())
}

/// [`is_token_valid`] at an explicit point in time.
///
/// Empty or undecodable tokens are invalid; a token without `exp` never
/// expires. Otherwise the token turns invalid halfway between `iat` and
/// `exp` (at `exp` when `iat` is missing).
pub fn is_token_valid_at(token: &str, now: SystemTime) -> bool {
    if token.is_empty() {
        return false;
    }
    let Ok(payload) = TokenPayload::decode(token) else {
        return false;
    };
    let Some(exp) = payload.exp else {
        return true;
    };

    let exp_ms = exp * 1000.0;
    let iat_ms = payload.iat.unwrap_or(exp) * 1000.0;
    let halfway_ms = exp_ms - (exp_ms - iat_ms) / 2.0;

    let now_ms = match now.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64() * 1000.0,
        Err(e) => -(e.duration().as_secs_f64() * 1000.0),
    };
    now_ms <= halfway_ms
}

/// Shorten a token for logs: first 20 and last 10 characters
pub fn display_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 30 {
        return token.to_string();
    }
    let head: String = chars[..20].iter().collect();
    let tail: String = chars[chars.len() - 10..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
pub(crate) fn jwt(payload: &serde_json::Value) -> String {
    let header = BASE64URL_NOPAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = BASE64URL_NOPAD.encode(payload.to_string().as_bytes());
    format!("{header}.{body}.signature")
}
