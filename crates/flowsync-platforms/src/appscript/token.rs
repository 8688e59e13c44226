//! Google OAuth tokens for the Drive API.
//!
//! Tokens come from a custom token file we own, or from clasp's own
//! `.clasprc.json`. Expired tokens are refreshed with the client id/secret
//! clasp stores. Only the custom file is ever written back.

use std::path::{Path, PathBuf};

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use flowsync_core::{Error, Result};

use crate::tracking::{read_record_lenient, write_record};

/// Refresh this long before the recorded expiry.
pub const REFRESH_BUFFER_MS: i64 = 5 * 60 * 1000;

pub const CUSTOM_TOKEN_FILE: &str = ".clasp-deployer-token.json";
pub const CLASPRC_FILE: &str = ".clasprc.json";

/// Where a token was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    Custom,
    Clasprc,
}

impl TokenSource {
    pub fn label(&self) -> &'static str {
        match self {
            TokenSource::Custom => "Custom Token",
            TokenSource::Clasprc => CLASPRC_FILE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidToken {
    pub access_token: String,
    pub source: TokenSource,
}

#[derive(Debug, Clone)]
struct ClientSecrets {
    client_id: String,
    client_secret: String,
}

/// Token files plus the endpoint used to refresh them.
#[derive(Debug, Clone)]
pub struct TokenStore {
    http: Client,
    custom_path: PathBuf,
    clasprc_path: PathBuf,
    token_url: String,
}

impl TokenStore {
    pub fn new(
        http: Client,
        custom_path: impl Into<PathBuf>,
        clasprc_path: impl Into<PathBuf>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            custom_path: custom_path.into(),
            clasprc_path: clasprc_path.into(),
            token_url: token_url.into(),
        }
    }

    /// `~/.clasp-deployer-token.json` and `~/.clasprc.json`.
    pub fn default_paths() -> Option<(PathBuf, PathBuf)> {
        let home = dirs::home_dir()?;
        Some((home.join(CUSTOM_TOKEN_FILE), home.join(CLASPRC_FILE)))
    }

    pub fn custom_path(&self) -> &Path {
        &self.custom_path
    }

    /// A usable access token, refreshing first if it is near expiry.
    /// `Ok(None)` when no token file holds a token. A failed refresh is
    /// logged and the old token returned.
    pub async fn get_valid_token(&self) -> Result<Option<ValidToken>> {
        let clasprc: Option<Value> = read_record_lenient(&self.clasprc_path);

        let custom = read_record_lenient::<Value>(&self.custom_path)
            .and_then(|v| v.as_object().cloned())
            .map(|tokens| (tokens, TokenSource::Custom));
        let Some((mut tokens, source)) = custom.or_else(|| {
            clasprc
                .as_ref()
                .and_then(clasprc_tokens)
                .map(|tokens| (tokens, TokenSource::Clasprc))
        }) else {
            return Ok(None);
        };

        let now = Utc::now().timestamp_millis();
        let secrets = clasprc.as_ref().and_then(clasprc_secrets);
        let refresh_token = tokens
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(String::from);

        if is_expired(&tokens, now) {
            if let (Some(refresh_token), Some(secrets)) = (refresh_token, secrets) {
                info!("[Apps Script] Refreshing expired token from {}...", source.label());
                match self.refresh(&secrets, &refresh_token).await {
                    Ok(response) => self.apply_refresh(&mut tokens, response, source, now),
                    Err(e) => warn!("[Apps Script] Token refresh failed: {}", e),
                }
            }
        }

        Ok(tokens
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(|access_token| ValidToken {
                access_token: access_token.to_string(),
                source,
            }))
    }

    async fn refresh(&self, secrets: &ClientSecrets, refresh_token: &str) -> Result<Map<String, Value>> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", secrets.client_id.as_str()),
                ("client_secret", secrets.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http(format!("{} {}", status, body.trim())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("Invalid token response: {}", e)))?;
        match body {
            Value::Object(map) if map.get("access_token").and_then(Value::as_str).is_some() => Ok(map),
            _ => Err(Error::Http("Token response has no access_token".into())),
        }
    }

    fn apply_refresh(
        &self,
        tokens: &mut Map<String, Value>,
        response: Map<String, Value>,
        source: TokenSource,
        now: i64,
    ) {
        let expires_in = response.get("expires_in").and_then(as_millis);
        tokens.extend(response);
        if let Some(seconds) = expires_in {
            tokens.insert("expiry_date".into(), Value::from(now + seconds * 1000));
        }

        // clasp's own credential file is left alone.
        if source == TokenSource::Custom {
            if let Err(e) = write_record(&self.custom_path, &*tokens) {
                warn!(
                    "[Apps Script] Failed to save refreshed token to {}: {}",
                    self.custom_path.display(),
                    e
                );
            }
        }
    }
}

fn as_millis(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

/// A token without `expiry_date` is treated as valid.
fn is_expired(tokens: &Map<String, Value>, now: i64) -> bool {
    tokens
        .get("expiry_date")
        .and_then(as_millis)
        .is_some_and(|expiry| now > expiry - REFRESH_BUFFER_MS)
}

/// Classic layout keeps `token`; newer clasp keeps `tokens.default`.
fn clasprc_tokens(rc: &Value) -> Option<Map<String, Value>> {
    rc.get("token")
        .or_else(|| rc.pointer("/tokens/default"))
        .and_then(Value::as_object)
        .cloned()
}

fn clasprc_secrets(rc: &Value) -> Option<ClientSecrets> {
    let pair = |v: &Value, id: &str, secret: &str| {
        Some(ClientSecrets {
            client_id: v.get(id)?.as_str()?.to_string(),
            client_secret: v.get(secret)?.as_str()?.to_string(),
        })
    };
    rc.get("oauth2ClientSettings")
        .and_then(|s| pair(s, "clientId", "clientSecret"))
        .or_else(|| {
            rc.pointer("/tokens/default")
                .and_then(|d| pair(d, "client_id", "client_secret"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expiry_buffer() {
        let now = 1_700_000_000_000;
        let expiring = json!({"expiry_date": now + 2 * 60 * 1000});
        let fresh = json!({"expiry_date": now + 10 * 60 * 1000});
        assert!(is_expired(expiring.as_object().unwrap(), now));
        assert!(!is_expired(fresh.as_object().unwrap(), now));
        assert!(!is_expired(json!({}).as_object().unwrap(), now));
    }

    #[test]
    fn test_clasprc_layouts() {
        let classic = json!({
            "token": {"access_token": "a1", "refresh_token": "r1"},
            "oauth2ClientSettings": {"clientId": "cid", "clientSecret": "cs"}
        });
        assert_eq!(clasprc_tokens(&classic).unwrap()["access_token"], "a1");
        assert_eq!(clasprc_secrets(&classic).unwrap().client_id, "cid");

        let newer = json!({
            "tokens": {"default": {
                "access_token": "a2",
                "refresh_token": "r2",
                "client_id": "cid2",
                "client_secret": "cs2"
            }}
        });
        assert_eq!(clasprc_tokens(&newer).unwrap()["access_token"], "a2");
        assert_eq!(clasprc_secrets(&newer).unwrap().client_secret, "cs2");
    }

    #[tokio::test]
    async fn test_custom_file_takes_priority() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join(CUSTOM_TOKEN_FILE);
        let clasprc = dir.path().join(CLASPRC_FILE);
        write_record(&custom, &json!({"access_token": "custom-token"})).unwrap();
        write_record(&clasprc, &json!({"token": {"access_token": "clasp-token"}})).unwrap();

        let store = TokenStore::new(Client::new(), &custom, &clasprc, "http://127.0.0.1:9/token");
        let token = store.get_valid_token().await.unwrap().unwrap();
        assert_eq!(token.access_token, "custom-token");
        assert_eq!(token.source, TokenSource::Custom);

        std::fs::remove_file(&custom).unwrap();
        let token = store.get_valid_token().await.unwrap().unwrap();
        assert_eq!(token.access_token, "clasp-token");
        assert_eq!(token.source.label(), ".clasprc.json");
    }

    #[tokio::test]
    async fn test_no_token_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(
            Client::new(),
            dir.path().join("a.json"),
            dir.path().join("b.json"),
            "http://127.0.0.1:9/token",
        );
        assert!(store.get_valid_token().await.unwrap().is_none());
    }
}
