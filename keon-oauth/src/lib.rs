//! Keon OAuth - token plumbing for the Keon cloud
//!
//! A partner access credential is turned into a registration token in two
//! steps: [`ServerSelector`] asks every regional OAuth server for an access
//! token and keeps the one that validates fastest, then
//! [`RegistrationTokenIssuer`] exchanges that access token for a
//! registration token carrying the routing data the device needs.
//!
//! # Example
//!
//! ```ignore
//! use keon_oauth::{HttpOauthApi, ServerList, token_for_keon_wifi};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), keon_oauth::ApiError> {
//!     let api = HttpOauthApi::new()?;
//!     let servers = ServerList::from_env();
//!     if let Some(tokens) = token_for_keon_wifi(&api, &servers, "PARTNER_TOKEN", None).await {
//!         println!("registration token: {}", tokens.registration_token.as_str());
//!     }
//!     Ok(())
//! }
//! ```

mod api;
#[cfg(test)]
mod fake;
mod issuer;
mod select;
mod servers;
mod token;

pub use api::{
    AccessTokens, ApiError, DEFAULT_REQUEST_TIMEOUT, HttpOauthApi, OauthApi, PARTNER_ACCESS_PATH,
    REGISTRATION_PATH, VALIDATION_PATH,
};
pub use issuer::{
    ControlCredentials, CredentialError, RegistrationTokenIssuer, WifiTokens,
    credential_for_control_server, token_for_keon_wifi,
};
pub use select::{BestServer, Selection, ServerSelector};
pub use servers::{AUS_SERVER, DEFAULT_SERVERS, EU_SERVER, OAUTH_SERVER_ENV, ServerList, US_SERVER};
pub use token::{
    RegistrationToken, RegistrationTokenData, TokenError, TokenPayload, display_token,
    is_token_valid, is_token_valid_at,
};
