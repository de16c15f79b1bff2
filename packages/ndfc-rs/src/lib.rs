//! Typed client for the Cisco Nexus Dashboard Fabric Controller HTTP API.
//!
//! Covers the slices of the API the provisioning controller needs: security
//! objects (groups, contracts, contract associations, protocols), LAN-fabric
//! inventory reads, and configuration deploy. Authentication is either a
//! long-lived API key (header pair) or a username/password login that yields
//! a bearer token; the token is cached and refreshed once on a 401.
//!
//! All failures surface as [`NdfcError`] so callers can branch on status
//! class and recover the upstream body for diagnostics.

pub mod deploy;
pub mod error;
pub mod inventory;
pub mod paths;
pub mod security;
pub mod types;

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{truncate_body, NdfcError};
use crate::types::{LoginRequest, LoginResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const LOGIN_DOMAIN: &str = "DefaultAuth";

#[derive(Debug, Clone)]
pub struct NdfcOptions {
    /// Base URL of the Nexus Dashboard, e.g. `https://nd.example.net`.
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Takes priority over username/password when set.
    pub api_key: Option<String>,
    /// Disable TLS verification (lab deployments only).
    pub insecure: bool,
    /// Total per-request timeout. Deploys can stall for minutes, so the
    /// default is deliberately generous.
    pub timeout: Duration,
}

impl NdfcOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            username: None,
            password: None,
            api_key: None,
            insecure: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct NdfcClient {
    http: Client,
    options: NdfcOptions,
    token: RwLock<Option<String>>,
}

impl NdfcClient {
    pub fn new(mut options: NdfcOptions) -> Result<Self, NdfcError> {
        while options.base_url.ends_with('/') {
            options.base_url.pop();
        }

        let http = Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.insecure)
            .build()?;

        Ok(Self {
            http,
            options,
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.options.base_url, path)
    }

    /// `POST /login` with the ND credential payload, caching the token.
    async fn login(&self) -> Result<String, NdfcError> {
        let user = self.options.username.clone().unwrap_or_default();
        let password = self.options.password.clone().unwrap_or_default();
        if user.is_empty() || password.is_empty() {
            return Err(NdfcError::Login {
                user,
                reason: "no API key and no username/password configured".into(),
            });
        }

        let request = LoginRequest {
            user_name: &user,
            user_passwd: &password,
            domain: LOGIN_DOMAIN,
        };

        let response = self
            .http
            .post(self.url("/login"))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(NdfcError::Login {
                user,
                reason: format!("status {}: {}", status.as_u16(), truncate_body(&body)),
            });
        }

        let parsed: LoginResponse = serde_json::from_str(&body).map_err(|source| NdfcError::Decode {
            path: "/login".into(),
            source,
        })?;

        let mut token = self.token.write().await;
        *token = Some(parsed.token.clone());
        debug!(user = %user, "logged in to fabric manager");
        Ok(parsed.token)
    }

    async fn cached_or_fresh_token(&self) -> Result<String, NdfcError> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.login().await
    }

    /// Issue one request with auth headers attached, returning the raw body
    /// on 2xx and a structured error otherwise. In token mode a single 401
    /// triggers a re-login and one retry.
    pub(crate) async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<String, NdfcError> {
        let mut refreshed = false;
        loop {
            let mut request = self.http.request(method.clone(), self.url(path));
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            request = if let Some(api_key) = &self.options.api_key {
                request.header("X-Nd-Apikey", api_key).header(
                    "X-Nd-Username",
                    self.options.username.as_deref().unwrap_or_default(),
                )
            } else {
                let token = self.cached_or_fresh_token().await?;
                request.header("Authorization", format!("Bearer {}", token))
            };

            debug!(method = %method, path = %path, "fabric manager request");
            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            if status.is_success() {
                return Ok(text);
            }

            // Expired bearer token: refresh once, then report the failure.
            if status == StatusCode::UNAUTHORIZED && self.options.api_key.is_none() && !refreshed {
                refreshed = true;
                self.token.write().await.take();
                self.login().await?;
                continue;
            }

            return Err(NdfcError::http(method.as_str(), path, status.as_u16(), &text));
        }
    }

    pub(crate) async fn get_json<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<R, NdfcError> {
        let text = self.send(Method::GET, path, query, None).await?;
        decode(path, &text)
    }

    pub(crate) async fn post_json<R: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<R, NdfcError> {
        let text = self.send(Method::POST, path, &[], Some(body)).await?;
        decode(path, &text)
    }

    pub(crate) async fn put_json<R: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<R, NdfcError> {
        let text = self.send(Method::PUT, path, &[], Some(body)).await?;
        decode(path, &text)
    }

    pub(crate) async fn delete(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<(), NdfcError> {
        self.send(Method::DELETE, path, query, None).await?;
        Ok(())
    }
}

fn decode<R: DeserializeOwned>(path: &str, text: &str) -> Result<R, NdfcError> {
    serde_json::from_str(text).map_err(|source| NdfcError::Decode {
        path: path.to_string(),
        source,
    })
}
