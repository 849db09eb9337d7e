//! Scripted [`OauthApi`] for selector and issuer tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::StatusCode;

use crate::{AccessTokens, ApiError, OauthApi};

fn failure(what: &str) -> ApiError {
    ApiError::Status {
        status: StatusCode::BAD_GATEWAY,
        text: what.to_string(),
    }
}

#[derive(Default)]
pub struct FakeApi {
    /// server -> access token; a missing server fails the fetch
    tokens: HashMap<String, Option<String>>,
    /// server -> latency in ms; a missing server fails validation
    latencies: HashMap<String, u64>,
    /// server -> registration token
    registrations: HashMap<String, String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn token(mut self, server: &str, token: &str) -> Self {
        self.tokens.insert(server.to_string(), Some(token.to_string()));
        self
    }

    /// Fetch succeeds but the response carries no access token
    pub fn no_token(mut self, server: &str) -> Self {
        self.tokens.insert(server.to_string(), None);
        self
    }

    pub fn latency(mut self, server: &str, ms: u64) -> Self {
        self.latencies.insert(server.to_string(), ms);
        self
    }

    pub fn registration(mut self, server: &str, token: &str) -> Self {
        self.registrations.insert(server.to_string(), token.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl OauthApi for FakeApi {
    async fn fetch_access_token(
        &self,
        server: &str,
        credential: &str,
        device_connection_key: Option<&str>,
    ) -> Result<AccessTokens, ApiError> {
        self.record(format!(
            "fetch {server} {credential} {}",
            device_connection_key.unwrap_or("-")
        ));
        match self.tokens.get(server) {
            Some(token) => Ok(AccessTokens {
                access_token: token.clone(),
                refresh_token: None,
            }),
            None => Err(failure("fetch")),
        }
    }

    async fn token_validation_time(
        &self,
        server: &str,
        access_token: &str,
    ) -> Result<Duration, ApiError> {
        self.record(format!("validate {server} {access_token}"));
        self.latencies
            .get(server)
            .map(|ms| Duration::from_millis(*ms))
            .ok_or_else(|| failure("validation"))
    }

    async fn fetch_registration_token(
        &self,
        server: &str,
        access_token: &str,
    ) -> Result<Option<String>, ApiError> {
        self.record(format!("register {server} {access_token}"));
        Ok(self.registrations.get(server).cloned())
    }
}
