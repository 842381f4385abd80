use std::future::Future;

use reqwest::{header, Method};
use snafu::prelude::*;

use super::error::variant::*;
use super::types::*;
use super::Result;
use crate::config::ConnectionConfig;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Backend HTTP API Client
#[derive(Debug, Clone)]
pub struct Client {
    client: reqwest::Client,
    base: url::Url,
}

impl Client {
    /// Create a client for `https://{origin}/api/v1/fiat/stripe`, authorized by bearer token.
    pub fn new<S: AsRef<str> + ?Sized>(origin: &S, bearer: &S) -> Result<Self> {
        Self::with_scheme(true, origin, bearer)
    }

    /// Like [`Client::new`], but plain `http` when `secure` is false.
    pub fn with_scheme<S: AsRef<str> + ?Sized>(secure: bool, origin: &S, bearer: &S) -> Result<Self> {
        let scheme = if secure { "https" } else { "http" };
        let url = format!("{}://{}/api/v1/fiat/stripe", scheme, origin.as_ref());
        let base = url::Url::parse(&url).with_context(|_| InvalidBaseURL { url: &url })?;
        Self::with_base_url(base, bearer)
    }

    /// Create a client from a config snapshot, `secure` picks https over http.
    pub fn from_config(config: &ConnectionConfig, secure: bool) -> Result<Self> {
        Self::with_scheme(secure, &config.origin, &config.bearer)
    }

    /// Create a client with an explicit base url.
    pub fn with_base_url<S: AsRef<str> + ?Sized>(base: url::Url, bearer: &S) -> Result<Self> {
        let auth_header_value = format!("Bearer {}", bearer.as_ref())
            .parse()
            .map_err(|_| TokenInvalid.build())?;

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth_header_value);

        let client = reqwest::Client::builder()
            .gzip(true)
            .deflate(true)
            .user_agent(APP_USER_AGENT)
            .default_headers(headers)
            .build()
            .context(ClientCreateFailed)?;

        Ok(Self { client, base })
    }

    /// Call `POST /connection_token` with an empty form body, get the token secret.
    pub async fn connection_token(&self) -> Result<String> {
        let url = format!("{}/connection_token", self.base.as_str().trim_end_matches('/'));

        let req = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("")
            .build()
            .context(BuildRequestFailed)?;

        log::debug!("Fetching connection token from {}", url);

        let resp = self
            .client
            .execute(req)
            .await
            .with_context(|_| RequestFailed {
                method: Method::POST,
                url: &url,
            })?;

        let status = resp.status();

        let body = resp.bytes().await.with_context(|_| RequestFailed {
            method: Method::POST,
            url: &url,
        })?;

        ensure!(
            status.is_success(),
            HTTPStatusNotOK {
                method: Method::POST,
                url: &url,
                status_code: status,
                body: String::from_utf8_lossy(&body),
            }
        );

        let data: ConnectionTokenData =
            serde_json::from_slice(&body).with_context(|_| ParseBodyFailed { body })?;

        data.secret
            .filter(|secret| !secret.trim().is_empty())
            .context(NoSecret)
    }
}

/// Source of connection tokens for the device capability layer.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    /// fetch a fresh connection token
    async fn connection_token(&self) -> Result<String>;
}

#[async_trait::async_trait]
impl TokenProvider for Client {
    async fn connection_token(&self) -> Result<String> {
        Client::connection_token(self).await
    }
}

#[async_trait::async_trait]
impl<F, Fut> TokenProvider for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<String>> + Send,
{
    async fn connection_token(&self) -> Result<String> {
        self().await
    }
}
