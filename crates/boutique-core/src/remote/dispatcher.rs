//! Dispatchers resolve a function name to an actual remote call.
//!
//! `FunctionsClient` talks to the hosted functions endpoint:
//! `POST {base_url}/functions/v1/{name}` with the project's anon key in
//! `apikey` and a bearer token (the operator's access token if set,
//! otherwise the anon key).

use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::{header, Client};
use serde_json::Value;
use tracing::debug;

use super::RemoteError;

/// HTTP request timeout in seconds.
/// Invoice rendering functions can take several seconds; 30s bounds a hung call.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Path segment under which functions are served.
const FUNCTIONS_PATH: &str = "functions/v1";

pub trait RemoteDispatcher: Send + Sync {
    /// Call `function` with `body`. Errors must be classified by kind.
    fn call<'a>(
        &'a self,
        function: &'a str,
        body: &'a Value,
    ) -> BoxFuture<'a, Result<Value, RemoteError>>;
}

/// HTTP dispatcher for the hosted functions endpoint.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct FunctionsClient {
    client: Client,
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
}

impl FunctionsClient {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            access_token: None,
        })
    }

    /// Create a client that authenticates as a signed-in user, sharing the
    /// connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            anon_key: self.anon_key.clone(),
            access_token: Some(token),
        }
    }

    pub fn function_url(&self, function: &str) -> String {
        format!("{}/{}/{}", self.base_url, FUNCTIONS_PATH, function)
    }

    async fn post(&self, function: &str, body: &Value) -> Result<Value, RemoteError> {
        let url = self.function_url(function);
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        let text = response.text().await?;
        debug!(function, status = %status, bytes = text.len(), "Function response received");

        if !status.is_success() {
            return Err(RemoteError::from_status(status, &text));
        }
        parse_body(&text, is_json)
    }
}

/// Interpret a successful response body: JSON when declared, text otherwise.
fn parse_body(text: &str, is_json: bool) -> Result<Value, RemoteError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    if is_json {
        serde_json::from_str(text)
            .map_err(|e| RemoteError::application(format!("Invalid JSON response: {}", e)))
    } else {
        Ok(Value::String(text.to_string()))
    }
}

impl RemoteDispatcher for FunctionsClient {
    fn call<'a>(
        &'a self,
        function: &'a str,
        body: &'a Value,
    ) -> BoxFuture<'a, Result<Value, RemoteError>> {
        Box::pin(self.post(function, body))
    }
}
