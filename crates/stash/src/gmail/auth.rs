//! OAuth2 token management for Google API access
//!
//! The daemon is headless and never runs an interactive consent flow.
//! Each account is seeded with a refresh token when it is imported, and
//! access tokens are minted from that refresh token on demand.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::config::GoogleCredentials;

/// Authentication failure that needs operator action, not a retry
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No stored token at {}", .0.display())]
    TokenMissing(PathBuf),
    #[error("Stored token has no refresh token")]
    NoRefreshToken,
    #[error("Token refresh rejected (status {0})")]
    RefreshRejected(u16),
}

/// OAuth2 token management for one account
#[derive(Clone)]
pub struct GoogleAuth {
    client_id: String,
    client_secret: String,
    token_path: PathBuf,
}

/// Stored token data
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
}

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    #[allow(dead_code)]
    token_type: String,
}

impl GoogleAuth {
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Create an auth instance with an explicit token file path
    pub fn new(client_id: String, client_secret: String, token_path: PathBuf) -> Self {
        Self {
            client_id,
            client_secret,
            token_path,
        }
    }

    /// Create an auth instance for a stored account
    ///
    /// Tokens live at ~/.config/mailstash/tokens/account-<id>.json.
    pub fn for_account(creds: &GoogleCredentials, account_id: i64) -> Result<Self> {
        let token_path = config::config_path(&format!("tokens/account-{}.json", account_id))
            .context("Could not determine config directory")?;

        Ok(Self::new(
            creds.client_id.clone(),
            creds.client_secret.clone(),
            token_path,
        ))
    }

    /// Get a valid access token, refreshing as needed
    pub fn get_access_token(&self) -> Result<String> {
        let token = self
            .load_token()
            .map_err(|_| AuthError::TokenMissing(self.token_path.clone()))?;

        // Check if the access token is still valid (with 5 minute buffer)
        if let Some(expires_at) = token.expires_at {
            let now = chrono::Utc::now().timestamp();
            if expires_at > now + 300 && !token.access_token.is_empty() {
                return Ok(token.access_token);
            }
        }

        let refresh_token = token.refresh_token.ok_or(AuthError::NoRefreshToken)?;
        let new_token = self.refresh_access_token(&refresh_token)?;
        self.save_token_response(&new_token)?;
        Ok(new_token.access_token)
    }

    /// Seed the token file with a refresh token obtained out of band
    ///
    /// The first `get_access_token` call after seeding exchanges it for an
    /// access token.
    pub fn seed_refresh_token(&self, refresh_token: &str) -> Result<()> {
        let stored = StoredToken {
            access_token: String::new(),
            refresh_token: Some(refresh_token.to_string()),
            expires_at: None,
        };
        self.write_token(&stored)
    }

    /// Copy a Google-format token JSON file into place for this account
    ///
    /// Accepts either our own StoredToken format or any JSON object with a
    /// `refresh_token` field (e.g. the output of an oauth helper script).
    pub fn import_token_file(&self, source: &std::path::Path) -> Result<()> {
        let content = fs::read_to_string(source)
            .with_context(|| format!("Failed to read token file {}", source.display()))?;

        let value: serde_json::Value =
            serde_json::from_str(&content).context("Token file is not valid JSON")?;
        let refresh_token = value
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .context("Token file has no refresh_token field")?;

        self.seed_refresh_token(refresh_token)
    }

    /// Refresh an access token using a refresh token
    fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResponse> {
        let response = ureq::post(Self::TOKEN_URL).send_form([
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ]);

        let response = match response {
            Ok(resp) => resp,
            // 4xx means the grant itself was rejected; retrying cannot help
            Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => {
                return Err(AuthError::RefreshRejected(code).into());
            }
            Err(e) => return Err(e).context("Failed to refresh access token"),
        };

        let mut token: TokenResponse = response
            .into_body()
            .read_json()
            .context("Failed to parse refresh token response")?;

        // Preserve the refresh token if not returned
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }

        Ok(token)
    }

    /// Load stored token from disk
    fn load_token(&self) -> Result<StoredToken> {
        let content = fs::read_to_string(&self.token_path)?;
        let token: StoredToken = serde_json::from_str(&content)?;
        Ok(token)
    }

    /// Save token response to disk
    fn save_token_response(&self, token: &TokenResponse) -> Result<()> {
        let stored = StoredToken {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token
                .expires_in
                .map(|d| chrono::Utc::now().timestamp() + d as i64),
        };
        self.write_token(&stored)
    }

    fn write_token(&self, stored: &StoredToken) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = self.token_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(stored)?;
        fs::write(&self.token_path, content)?;
        Ok(())
    }
}
