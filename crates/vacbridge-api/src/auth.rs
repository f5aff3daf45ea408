// OAuth credential lifecycle for the Slamtec identity endpoint.
//
// Password grant and refresh-token grant against `POST /oauth/token`, with
// client credentials in HTTP Basic and the grant in a form body. The current
// credential lives behind a single async mutex so that concurrent callers
// finding an expired token wait on one exchange instead of racing their own.

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::Error;

/// OAuth client id shipped with the vendor's mobile app.
pub const DEFAULT_CLIENT_ID: &str = "blitz_wolf";
/// OAuth client secret shipped with the vendor's mobile app.
pub const DEFAULT_CLIENT_SECRET: &str = "y@c9w&L7Ht";

const TOKEN_PATH: &str = "/oauth/token";
const DEFAULT_EXPIRES_IN: i64 = 1800;
const EXPIRY_MARGIN_SECS: i64 = 60;
const MIN_LIFETIME_SECS: i64 = 1;

/// OAuth client credentials sent as HTTP Basic on every token request.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

impl Default for ClientCredentials {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.into(),
            client_secret: SecretString::from(DEFAULT_CLIENT_SECRET),
        }
    }
}

/// Raw token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// A bearer token plus the instant after which it must not be used.
///
/// Replaced wholesale on every exchange, never patched in place.
#[derive(Debug, Clone)]
pub struct Credential {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
    expires_at: DateTime<Utc>,
}

impl Credential {
    /// Build a credential from an exchange performed at `now`.
    ///
    /// The safety margin is 60 s, shrunk to half the lifetime for very short
    /// lifetimes. A zero or negative `expires_in` counts as one second, so a
    /// fresh credential is never already expired.
    fn issued(
        response: TokenResponse,
        previous_refresh: Option<SecretString>,
        now: DateTime<Utc>,
    ) -> Self {
        let ttl = response
            .expires_in
            .unwrap_or(DEFAULT_EXPIRES_IN)
            .max(MIN_LIFETIME_SECS);
        let margin = EXPIRY_MARGIN_SECS.min(ttl / 2);
        let refresh_token = response
            .refresh_token
            .map(SecretString::from)
            .or(previous_refresh);

        Self {
            access_token: SecretString::from(response.access_token),
            refresh_token,
            expires_at: now + TimeDelta::seconds(ttl - margin),
        }
    }

    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&SecretString> {
        self.refresh_token.as_ref()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token is at or past its (margin-adjusted) expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Owns the account's credential and keeps it valid.
pub struct TokenManager {
    http: reqwest::Client,
    token_url: Url,
    client: ClientCredentials,
    email: String,
    password: SecretString,
    credential: Mutex<Option<Credential>>,
}

impl TokenManager {
    pub fn new(
        http: reqwest::Client,
        base_url: &Url,
        client: ClientCredentials,
        email: impl Into<String>,
        password: SecretString,
    ) -> Result<Self, Error> {
        Ok(Self {
            http,
            token_url: base_url.join(TOKEN_PATH)?,
            client,
            email: email.into(),
            password,
            credential: Mutex::new(None),
        })
    }

    /// Copy of the current credential, if one has been obtained.
    pub async fn credential(&self) -> Option<Credential> {
        self.credential.lock().await.clone()
    }

    /// Run the password grant and replace the stored credential.
    ///
    /// A 400 or 401 from the endpoint is an [`Error::Authentication`];
    /// anything else non-2xx is an [`Error::Api`].
    pub async fn authenticate(&self) -> Result<SecretString, Error> {
        let mut slot = self.credential.lock().await;
        self.authenticate_locked(&mut slot).await
    }

    /// Exchange the refresh token for a new credential.
    ///
    /// Falls back to the password grant when no refresh token is held or
    /// when the endpoint rejects it.
    pub async fn refresh(&self) -> Result<SecretString, Error> {
        let mut slot = self.credential.lock().await;
        self.refresh_locked(&mut slot).await
    }

    /// Return a token that is valid right now, exchanging first if needed.
    pub async fn ensure_valid(&self) -> Result<SecretString, Error> {
        let mut slot = self.credential.lock().await;
        let now = Utc::now();
        if let Some(token) = slot
            .as_ref()
            .filter(|c| !c.is_expired_at(now))
            .map(|c| c.access_token.clone())
        {
            return Ok(token);
        }

        if slot.is_some() {
            debug!("access token expired, refreshing");
            self.refresh_locked(&mut slot).await
        } else {
            self.authenticate_locked(&mut slot).await
        }
    }

    async fn authenticate_locked(
        &self,
        slot: &mut Option<Credential>,
    ) -> Result<SecretString, Error> {
        debug!(email = %self.email, "requesting token with password grant");
        let form = [
            ("grant_type", "password"),
            ("username", self.email.as_str()),
            ("password", self.password.expose_secret()),
        ];
        let response = self.exchange(&form).await?;
        let credential = Credential::issued(response, None, Utc::now());
        let token = credential.access_token.clone();
        info!(expires_at = %credential.expires_at, "authenticated");
        *slot = Some(credential);
        Ok(token)
    }

    async fn refresh_locked(&self, slot: &mut Option<Credential>) -> Result<SecretString, Error> {
        let Some(refresh_token) = slot.as_ref().and_then(|c| c.refresh_token.clone()) else {
            return self.authenticate_locked(slot).await;
        };

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.expose_secret()),
        ];
        match self.exchange(&form).await {
            Ok(response) => {
                let credential = Credential::issued(response, Some(refresh_token), Utc::now());
                let token = credential.access_token.clone();
                debug!(expires_at = %credential.expires_at, "token refreshed");
                *slot = Some(credential);
                Ok(token)
            }
            Err(Error::Authentication { message }) => {
                warn!(reason = %message, "refresh token rejected, re-authenticating");
                self.authenticate_locked(slot).await
            }
            Err(e) => Err(e),
        }
    }

    async fn exchange(&self, form: &[(&str, &str)]) -> Result<TokenResponse, Error> {
        let resp = self
            .http
            .post(self.token_url.clone())
            .basic_auth(
                &self.client.client_id,
                Some(self.client.client_secret.expose_secret()),
            )
            .form(form)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        match status.as_u16() {
            400 => {
                return Err(Error::Authentication {
                    message: "invalid credentials".into(),
                });
            }
            401 => {
                return Err(Error::Authentication {
                    message: "unauthorized client".into(),
                });
            }
            _ => {}
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: preview(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("token response: {e}"),
            body: preview(&body),
        })
    }
}

fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}
