//! Authenticated JSON transport for the App Store Connect API.
//!
//! Attaches the bearer credential, serializes request bodies, and turns
//! non-success statuses and malformed JSON into infrastructure errors.

use crate::delivery::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{
    Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use url::Url;

/// Default App Store Connect API root.
pub const DEFAULT_BASE_URL: &str = "https://api.appstoreconnect.apple.com/";

/// Issues the bearer credential attached to every API request.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String>;
}

/// Serves a credential issued ahead of time (e.g. from `ASC_TOKEN`).
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// A request relative to the API root.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A successful API response. `data` is `None` for empty bodies and 204.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub data: Option<serde_json::Value>,
}

impl ApiResponse {
    /// Deserializes the response body, failing when it is absent.
    pub fn decode<T: DeserializeOwned>(self, what: &str) -> Result<T> {
        let data = self.data.ok_or_else(|| {
            Error::infrastructure(format!("Malformed {} payload: empty response body.", what))
        })?;
        serde_json::from_value(data).map_err(|e| {
            Error::infrastructure_with(format!("Malformed {} payload: {}", what, e), e)
        })
    }
}

/// Sends authenticated requests and returns decoded JSON.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), base_url, tokens)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        // Url::join drops the last segment unless the base ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client,
            base_url,
            tokens,
        })
    }

    fn build_url(&self, path: &str, query: &[(String, String)]) -> Result<Url> {
        let mut url = self.base_url.join(path.trim_start_matches('/'))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
        let token = self.tokens.token().await?;
        let url = self.build_url(&request.path, &request.query)?;
        log::debug!("{} {}", request.method, url);

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .header(AUTHORIZATION, format!("Bearer {}", token));
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("").to_string()
            } else {
                body
            };
            return Err(Error::infrastructure(format!(
                "App Store Connect request failed ({}): {}",
                status.as_u16(),
                detail
            )));
        }

        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(ApiResponse {
                status: status.as_u16(),
                data: None,
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(ApiResponse {
                status: status.as_u16(),
                data: None,
            });
        }

        let data = serde_json::from_str(&text).map_err(|e| {
            Error::infrastructure_with("Received invalid JSON from App Store Connect.", e)
        })?;

        Ok(ApiResponse {
            status: status.as_u16(),
            data: Some(data),
        })
    }
}
