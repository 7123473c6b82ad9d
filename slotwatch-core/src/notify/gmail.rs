use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{resolve_path, NotifierSection};

use super::message::{encode_raw, EmailMessage};
use super::{Notifier, NotifyError, NotifyResult};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SEND_ENDPOINT: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";
/// Tokens this close to expiry are refreshed instead of reused.
const EXPIRY_MARGIN_SECONDS: i64 = 60;

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    client_id: String,
    client_secret: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Token file written by the offline consent step.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredToken {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Milliseconds since the epoch.
    pub expiry_date: Option<i64>,
}

impl StoredToken {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry_date
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
    }

    pub fn usable_access_token(&self, now: DateTime<Utc>) -> Option<AccessToken> {
        let value = self.access_token.as_ref()?;
        let expires_at = self.expires_at()?;
        let token = AccessToken {
            value: SecretString::new(value.clone()),
            expires_at,
        };
        token.is_fresh(now).then_some(token)
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
pub struct AccessToken {
    value: SecretString,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .checked_sub_signed(ChronoDuration::seconds(EXPIRY_MARGIN_SECONDS))
            .map_or(false, |refresh_at| refresh_at > now)
    }
}

/// Sends mail through the Gmail REST API using a stored OAuth refresh token.
pub struct GmailNotifier {
    client: reqwest::Client,
    config: NotifierSection,
    base_dir: PathBuf,
    cached: Mutex<Option<AccessToken>>,
}

impl GmailNotifier {
    pub fn new(config: NotifierSection, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            base_dir: base_dir.into(),
            cached: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> NotifyResult<SecretString> {
        let mut guard = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = guard.as_ref().filter(|token| token.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        let token_path = resolve_path(&self.base_dir, &self.config.token_path);
        let stored: StoredToken = read_json(&token_path).await?;
        if let Some(token) = stored.usable_access_token(now) {
            debug!("reusing stored Gmail access token");
            let value = token.value.clone();
            *guard = Some(token);
            return Ok(value);
        }

        let refreshed = self.refresh(&stored).await?;
        let value = refreshed.value.clone();
        *guard = Some(refreshed);
        Ok(value)
    }

    async fn refresh(&self, stored: &StoredToken) -> NotifyResult<AccessToken> {
        let refresh_token = stored.refresh_token.as_deref().ok_or_else(|| {
            NotifyError::Authorization(
                "token file has no refresh_token; re-run the consent step".into(),
            )
        })?;
        let secret_path = resolve_path(&self.base_dir, &self.config.client_secret_path);
        let file: ClientSecretFile = read_json(&secret_path).await?;
        let client = file.installed.or(file.web).ok_or_else(|| {
            NotifyError::Authorization(format!(
                "{} has neither an installed nor a web client",
                secret_path.display()
            ))
        })?;
        let client_secret = SecretString::new(client.client_secret);

        info!("refreshing Gmail access token");
        let response = self
            .client
            .post(&client.token_uri)
            .form(&[
                ("client_id", client.client_id.as_str()),
                ("client_secret", client_secret.expose_secret().as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Authorization(format!(
                "token endpoint returned {status}: {body}"
            )));
        }
        let refreshed: RefreshResponse = response.json().await?;
        Ok(AccessToken {
            expires_at: expiry_after(Utc::now(), refreshed.expires_in)?,
            value: SecretString::new(refreshed.access_token),
        })
    }
}

fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> NotifyResult<DateTime<Utc>> {
    ChronoDuration::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| {
            NotifyError::Authorization(format!(
                "token endpoint returned an out-of-range expires_in of {expires_in}"
            ))
        })
}

#[async_trait]
impl Notifier for GmailNotifier {
    async fn send(&self, message: &str) -> NotifyResult<()> {
        let token = self.access_token().await?;
        let email = EmailMessage {
            from: &self.config.from,
            to: &self.config.to,
            subject: &self.config.subject,
            body: message,
        };
        let raw = encode_raw(&email.render());
        let response = self
            .client
            .post(SEND_ENDPOINT)
            .bearer_auth(token.expose_secret())
            .json(&json!({ "raw": raw }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        info!(to = %self.config.to, "notification email sent");
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> NotifyResult<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| NotifyError::Io {
            source,
            path: path.to_path_buf(),
        })?;
    serde_json::from_str(&content).map_err(|source| NotifyError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
