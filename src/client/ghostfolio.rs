//! Ghostfolio REST client
//!
//! Exchanges the long-lived access token for a bearer token on first use and
//! re-authenticates once when a request comes back 401.

use super::{http_client, status_error, NewOrder, OrderQuery, PortfolioSource, SourceConnector};
use crate::error::OrchestrationError;
use crate::tracking::token_fingerprint;
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    auth_token: String,
}

pub struct GhostfolioClient {
    client: Client,
    base_url: String,
    access_token: String,
    bearer: RwLock<Option<String>>,
}

impl GhostfolioClient {
    pub fn new(base_url: &str, access_token: &str) -> Result<Self> {
        Ok(Self::with_client(http_client()?, base_url, access_token))
    }

    pub fn with_client(client: Client, base_url: &str, access_token: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            bearer: RwLock::new(None),
        }
    }

    /// Exchange the access token for a fresh bearer token
    pub async fn authenticate(&self) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/v1/auth/anonymous", self.base_url))
            .json(&json!({ "accessToken": self.access_token }))
            .send()
            .await?;

        if !response.status().is_success() {
            let err = status_error(response).await;
            warn!(
                user = %token_fingerprint(&self.access_token),
                error = %err,
                "Ghostfolio authentication failed"
            );
            return Err(err);
        }

        let auth: AuthResponse = response.json().await?;
        *self.bearer.write().await = Some(auth.auth_token.clone());
        info!(user = %token_fingerprint(&self.access_token), "Authenticated with Ghostfolio");
        Ok(auth.auth_token)
    }

    async fn bearer_token(&self) -> Result<String> {
        if let Some(token) = self.bearer.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.authenticate().await
    }

    async fn send(
        &self,
        method: &Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        bearer: &str,
    ) -> Result<Response> {
        let mut request = self
            .client
            .request(method.clone(), format!("{}{}", self.base_url, path))
            .bearer_auth(bearer);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let bearer = self.bearer_token().await?;
        let mut response = self.send(&method, path, query, body, &bearer).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!(path, "Bearer token rejected, re-authenticating");
            let bearer = self.authenticate().await?;
            response = self.send(&method, path, query, body, &bearer).await?;

            if response.status() == StatusCode::UNAUTHORIZED {
                warn!(
                    user = %token_fingerprint(&self.access_token),
                    path,
                    "Fresh bearer token rejected, session expired"
                );
                *self.bearer.write().await = None;
                return Err(OrchestrationError::AuthExpired);
            }
        }

        if !response.status().is_success() {
            let err = status_error(response).await;
            debug!(path, error = %err, "Ghostfolio request failed");
            return Err(err);
        }

        Ok(response.json::<Value>().await?)
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        self.request(Method::GET, path, query, None).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, path, &[], Some(body)).await
    }
}

#[async_trait]
impl PortfolioSource for GhostfolioClient {
    async fn portfolio_details(&self) -> Result<Value> {
        self.get("/api/v1/portfolio/details", &[]).await
    }

    async fn portfolio_performance(&self, date_range: &str) -> Result<Value> {
        self.get("/api/v2/portfolio/performance", &[("range", date_range.to_string())])
            .await
    }

    async fn holding_detail(&self, data_source: &str, symbol: &str) -> Result<Value> {
        self.get(
            &format!("/api/v1/portfolio/holding/{}/{}", data_source, symbol),
            &[],
        )
        .await
    }

    async fn orders(&self, query: &OrderQuery) -> Result<Value> {
        self.get("/api/v1/order", &query.params()).await
    }

    async fn dividends(&self, data_source: &str, symbol: &str) -> Result<Value> {
        self.get(
            &format!("/api/v1/portfolio/dividends/{}/{}", data_source, symbol),
            &[],
        )
        .await
    }

    async fn lookup_symbol(&self, query: &str) -> Result<Value> {
        self.get("/api/v1/symbol/lookup", &[("query", query.to_string())])
            .await
    }

    async fn accounts(&self) -> Result<Value> {
        self.get("/api/v1/account", &[]).await
    }

    async fn create_account(&self, name: &str, currency: &str) -> Result<Value> {
        let body = json!({
            "balance": 0,
            "currency": currency,
            "isExcluded": false,
            "name": name,
            "platformId": null,
        });
        self.post("/api/v1/account", &body).await
    }

    async fn create_order(&self, order: &NewOrder) -> Result<Value> {
        order.validate()?;
        let body = serde_json::to_value(order)?;
        self.post("/api/v1/order", &body).await
    }
}

/// Creates per-user clients that share one connection pool
pub struct GhostfolioConnector {
    client: Client,
    base_url: String,
}

impl GhostfolioConnector {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.to_string(),
        })
    }
}

#[async_trait]
impl SourceConnector for GhostfolioConnector {
    async fn connect(&self, token: &str) -> Result<Arc<dyn PortfolioSource>> {
        let source = GhostfolioClient::with_client(self.client.clone(), &self.base_url, token);
        source.authenticate().await?;
        Ok(Arc::new(source))
    }
}
