use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};

use crate::error::{SyncError, SyncResult};

pub const API_PREFIX: &str = "Ratings";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        })
    }
}

/// A request against the `/Ratings` surface. `path` is relative to it,
/// e.g. `Chat/Messages`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The only way the sync core reaches the server.
///
/// Implementations return `Err` only when no HTTP response was obtained;
/// status handling is done by [`RatingsApi`](super::api::RatingsApi).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> SyncResult<ApiResponse>;
}

/// reqwest-backed transport with bearer auth.
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpTransport {
    pub fn new(server_url: &str, auth_token: Option<String>) -> SyncResult<Self> {
        let mut root = server_url.trim_end_matches('/').to_string();
        root.push('/');
        root.push_str(API_PREFIX);
        root.push('/');
        let base_url = Url::parse(&root)
            .map_err(|err| SyncError::InvalidUrl(format!("`{server_url}`: {err}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("ratings-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| SyncError::TransientNetwork(err.to_string()))?;

        Ok(Self {
            client,
            base_url,
            auth_token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> SyncResult<ApiResponse> {
        let url = self
            .base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|err| SyncError::InvalidUrl(format!("`{}`: {err}", request.path)))?;

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Delete => self.client.delete(url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &self.auth_token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_string());
        }

        let response = builder
            .send()
            .await
            .map_err(|err| SyncError::TransientNetwork(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| SyncError::TransientNetwork(err.to_string()))?;

        log::trace!("{} {} -> {status}", request.method, request.path);
        Ok(ApiResponse { status, body })
    }
}
