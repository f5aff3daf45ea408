// Cloud HTTP client
//
// Wraps `reqwest::Client` with bearer-token injection, vendor media types
// and a single refresh-and-retry on 401. Endpoint methods live in
// `account.rs` as inherent methods.

use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::auth::TokenManager;
use crate::error::Error;

/// Authenticated client for the cloud resource endpoints.
#[derive(Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: Arc<TokenManager>,
}

impl CloudClient {
    /// Create a client that shares `tokens` with the device session.
    ///
    /// `base_url` is the cloud root, e.g. `https://cloud.slamtec.com`.
    pub fn new(http: reqwest::Client, base_url: Url, tokens: Arc<TokenManager>) -> Self {
        Self {
            http,
            base_url,
            tokens,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    /// GET `url` with the given vendor media type.
    ///
    /// A 401 triggers exactly one token refresh and one retry; a second
    /// 401 is returned as [`Error::Authentication`].
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url, accept: &str) -> Result<T, Error> {
        let token = self.tokens.ensure_valid().await?;
        debug!("GET {}", url);

        let mut resp = self.send_get(&url, accept, &token).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            debug!(url = %url, "got 401, refreshing token and retrying once");
            let token = self.tokens.refresh().await?;
            resp = self.send_get(&url, accept, &token).await?;
        }

        Self::parse(resp).await
    }

    async fn send_get(
        &self,
        url: &Url,
        accept: &str,
        token: &SecretString,
    ) -> Result<reqwest::Response, Error> {
        self.http
            .get(url.clone())
            .bearer_auth(token.expose_secret())
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(Error::Transport)
    }

    async fn parse<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "token rejected after refresh".into(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        trace!(status = %status, body = %body, "cloud response");

        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}
