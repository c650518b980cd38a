//! HTTP client for the session gateway and config endpoint

use crate::config::{ConnectionProfile, Settings};
use crate::error::{PrismError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};
use url::Url;

const USER_FILE: &str = "user.json";

/// Display-only user info, cached locally between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: u64,
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionStatus {
    pub authenticated: bool,
    #[serde(default)]
    pub user: Option<UserInfo>,
}

/// Client bound to one gateway base URL
///
/// Holds a cookie store so the signed session cookie set by the OAuth
/// callback travels with every call.
#[derive(Debug)]
pub struct GatewayClient {
    base: Url,
    http: reqwest::Client,
    store_root: PathBuf,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(PrismError::config(
                "gateway_url is not configured (set it in prism.conf or PRISM_GATEWAY_URL)",
            ));
        }
        let base = Url::parse(base_url.trim())
            .map_err(|e| PrismError::config(format!("invalid gateway_url: {e}")))?;
        Ok(Self {
            base,
            http: reqwest::Client::builder().cookie_store(true).build()?,
            store_root: Settings::config_dir()?,
        })
    }

    /// Override where display-only user info is cached
    pub fn with_store_root(mut self, root: PathBuf) -> Self {
        self.store_root = root;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| PrismError::config(format!("invalid gateway path '{path}': {e}")))
    }

    /// Check the current session
    ///
    /// Any non-2xx response means "not logged in", not an error; only
    /// transport failures propagate.
    pub async fn session_check(&self) -> Result<SessionStatus> {
        let response = self.http.get(self.endpoint("api/auth/session")?).send().await?;

        if !response.status().is_success() {
            self.clear_cached_user().await;
            return Ok(SessionStatus { authenticated: false, user: None });
        }

        let status = response.json::<SessionStatus>().await?;
        if status.authenticated {
            if let Some(user) = &status.user {
                self.write_cached_user(user).await;
            }
        } else {
            self.clear_cached_user().await;
        }
        Ok(status)
    }

    /// End the session; cached user display state is cleared no matter
    /// what the body says
    pub async fn logout(&self) -> Result<()> {
        let response = self.http.post(self.endpoint("api/auth/logout")?).send().await?;
        self.clear_cached_user().await;

        if !response.status().is_success() {
            return Err(PrismError::remote(format!(
                "logout rejected with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// URL of the redirect-based login flow
    pub fn login_url(&self) -> Result<String> {
        Ok(self.endpoint("api/auth/login")?.to_string())
    }

    /// Open the login flow in the browser, best-effort; returns the URL
    /// either way so the caller can display it
    pub fn open_login(&self) -> Result<String> {
        let url = self.login_url()?;
        if let Err(e) = opener::open(&url) {
            warn!("could not open browser: {e}");
        }
        Ok(url)
    }

    /// Bootstrap profiles from the remote config endpoint
    ///
    /// Returns untyped JSON objects; callers run them through validated
    /// profile construction. A non-2xx is a hard failure for this sync
    /// attempt only.
    pub async fn fetch_profiles(&self) -> Result<Vec<serde_json::Value>> {
        let response = self.http.get(self.endpoint("api/configs")?).send().await?;

        if !response.status().is_success() {
            return Err(PrismError::remote(format!(
                "config fetch rejected with status {}",
                response.status()
            )));
        }
        Ok(response.json::<Vec<serde_json::Value>>().await?)
    }

    /// Push the profile list to the config endpoint
    ///
    /// An environment-managed backend rejects this with a read-only
    /// error; that is surfaced as a recoverable remote failure.
    pub async fn push_profiles(&self, profiles: &[ConnectionProfile]) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint("api/configs")?)
            .json(profiles)
            .send()
            .await?;

        if !response.status().is_success() {
            #[derive(Deserialize)]
            struct ErrorBody {
                error: Option<String>,
            }
            let status = response.status();
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| format!("config push rejected with status {status}"));
            return Err(PrismError::remote(message));
        }
        Ok(())
    }

    /// Read the locally cached user, best-effort
    pub async fn cached_user(&self) -> Option<UserInfo> {
        let path = self.store_root.join(USER_FILE);
        let contents = tokio::fs::read_to_string(&path).await.ok()?;
        serde_json::from_str(&contents).ok()
    }

    async fn write_cached_user(&self, user: &UserInfo) {
        let write = async {
            tokio::fs::create_dir_all(&self.store_root).await?;
            let contents = serde_json::to_string(user)?;
            tokio::fs::write(self.store_root.join(USER_FILE), contents).await?;
            Ok::<(), PrismError>(())
        };
        if let Err(e) = write.await {
            debug!("{}", PrismError::cache(e.to_string()));
        }
    }

    async fn clear_cached_user(&self) {
        let _ = tokio::fs::remove_file(self.store_root.join(USER_FILE)).await;
    }
}
