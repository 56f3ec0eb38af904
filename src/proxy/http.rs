//! HTTP client for the proxy engine's admin and stats API.
//!
//! # Example
//!
//! ```no_run
//! use panel_agent::proxy::HttpProxyApi;
//!
//! let api = HttpProxyApi::new("http://127.0.0.1:10085", "proxy", Some("node-token".into()));
//! ```

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};

use crate::model::AddUserRequest;

use super::{HandlerApi, ProxyError, StatsApi};

/// HTTP implementation of both engine surfaces.
///
/// User endpoints are scoped to the inbound tag this node manages; stats
/// counters are engine-wide per email label.
#[derive(Debug, Clone)]
pub struct HttpProxyApi {
    client: Client,
    base: String,
    inbound_tag: String,
    token: Option<String>,
}

impl HttpProxyApi {
    /// Create a new client for the engine's admin API.
    pub fn new(base_url: impl Into<String>, inbound_tag: impl Into<String>, token: Option<String>) -> Self {
        Self::with_client(Client::new(), base_url, inbound_tag, token)
    }

    /// Create with a custom reqwest [`Client`] (for timeouts, proxies, etc.).
    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        inbound_tag: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        let base = base_url.into();
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            inbound_tag: inbound_tag.into(),
            token,
        }
    }

    fn users_url(&self) -> String {
        format!("{}/inbounds/{}/users", self.base, self.inbound_tag)
    }

    fn user_url(&self, email: &str) -> String {
        format!("{}/inbounds/{}/users/{}", self.base, self.inbound_tag, email)
    }

    fn stat_url(&self, email: &str, direction: &str) -> String {
        format!("{}/stats/users/{}/{}", self.base, email, direction)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.header("Authorization", format!("Bearer {token}")),
            None => req,
        }
    }

    async fn api_error(resp: reqwest::Response) -> ProxyError {
        let status = resp.status().as_u16();
        let message = resp.text().await.unwrap_or_default();
        ProxyError::Api { status, message }
    }

    /// Read and reset one traffic counter.
    ///
    /// A 404 means the counter does not exist yet — the engine only
    /// creates counters once a user moves their first byte — and reads
    /// as zero rather than an error.
    async fn read_stat(&self, email: &str, direction: &str) -> Result<u64, ProxyError> {
        let resp = self
            .authorize(self.client.get(self.stat_url(email, direction)))
            .query(&[("reset", "true")])
            .send()
            .await
            .map_err(ProxyError::transport)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        if !resp.status().is_success() {
            return Err(Self::api_error(resp).await);
        }

        let stat: wire::StatValue = resp.json().await.map_err(ProxyError::transport)?;
        Ok(stat.value)
    }
}

#[async_trait]
impl HandlerApi for HttpProxyApi {
    async fn add_user(&self, request: &AddUserRequest) -> Result<(), ProxyError> {
        let resp = self
            .authorize(self.client.post(self.users_url()))
            .json(request)
            .send()
            .await
            .map_err(ProxyError::transport)?;

        if !resp.status().is_success() {
            return Err(Self::api_error(resp).await);
        }
        Ok(())
    }

    async fn remove_user(&self, email: &str) -> Result<(), ProxyError> {
        let resp = self
            .authorize(self.client.delete(self.user_url(email)))
            .send()
            .await
            .map_err(ProxyError::transport)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ProxyError::NotFound(email.to_string()));
        }
        if !resp.status().is_success() {
            return Err(Self::api_error(resp).await);
        }
        Ok(())
    }
}

#[async_trait]
impl StatsApi for HttpProxyApi {
    async fn user_uplink(&self, email: &str) -> Result<u64, ProxyError> {
        self.read_stat(email, "uplink").await
    }

    async fn user_downlink(&self, email: &str) -> Result<u64, ProxyError> {
        self.read_stat(email, "downlink").await
    }
}

// ── Wire types ────────────────────────────────────────────────────

mod wire {
    use serde::Deserialize;

    #[derive(Deserialize)]
    pub struct StatValue {
        pub value: u64,
    }
}
