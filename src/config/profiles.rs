//! Credential store for named store connection profiles
//!
//! Profiles are persisted immediately on every mutation: `profiles.json`
//! holds the profile list, `active_profile` the id of the currently
//! selected profile. Secret fields are zeroized on drop and masked in
//! any display output.

use crate::config::Settings;
use crate::error::{PrismError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

const PROFILES_FILE: &str = "profiles.json";
const ACTIVE_FILE: &str = "active_profile";
const SKIP_GUIDE_FILE: &str = "skip_guide";

/// One store endpoint identity
///
/// `endpoint` overrides the account-derived endpoint when set;
/// `custom_domain` is only used for public URL derivation.
#[derive(Clone, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    #[zeroize(skip)]
    pub id: String,
    #[zeroize(skip)]
    pub name: String,
    #[zeroize(skip)]
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    #[zeroize(skip)]
    pub bucket_name: String,
    #[zeroize(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[zeroize(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_domain: Option<String>,
    #[zeroize(skip)]
    #[serde(default)]
    pub is_default: bool,
}

impl std::fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("account_id", &self.account_id)
            .field("access_key_id", &crate::utils::format::mask_secret(&self.access_key_id))
            .field("secret_access_key", &"****")
            .field("bucket_name", &self.bucket_name)
            .field("endpoint", &self.endpoint)
            .field("custom_domain", &self.custom_domain)
            .field("is_default", &self.is_default)
            .finish()
    }
}

impl ConnectionProfile {
    /// Build a profile from an untyped JSON object, validating every
    /// required field up front
    ///
    /// A missing `id` is coerced to a fresh one; a missing `name` falls
    /// back to the bucket name. Everything the connection itself needs is
    /// required and produces a `ConfigError` naming the field.
    pub fn from_json_value(value: &serde_json::Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| PrismError::config("profile entry is not a JSON object"))?;

        let opt_str = |field: &str| -> Option<String> {
            obj.get(field)
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let required_str = |field: &str| -> Result<String> {
            opt_str(field)
                .ok_or_else(|| PrismError::config(format!("profile field '{field}' is missing")))
        };

        let account_id = opt_str("accountId");
        let endpoint = opt_str("endpoint");
        if account_id.is_none() && endpoint.is_none() {
            return Err(PrismError::config(
                "profile field 'accountId' is missing (or provide 'endpoint')",
            ));
        }

        let bucket_name = required_str("bucketName")?;
        let profile = Self {
            id: opt_str("id").unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name: opt_str("name").unwrap_or_else(|| bucket_name.clone()),
            account_id: account_id.unwrap_or_default(),
            access_key_id: required_str("accessKeyId")?,
            secret_access_key: required_str("secretAccessKey")?,
            bucket_name,
            endpoint,
            custom_domain: opt_str("customDomain"),
            is_default: obj.get("isDefault").and_then(|v| v.as_bool()).unwrap_or(false),
        };

        profile.validate()?;
        Ok(profile)
    }

    /// Check the fields the connection manager needs, after trimming
    pub fn validate(&self) -> Result<()> {
        if self.account_id.trim().is_empty()
            && self.endpoint.as_deref().map_or(true, |e| e.trim().is_empty())
        {
            return Err(PrismError::config(
                "profile needs an account id or an explicit endpoint",
            ));
        }
        if self.access_key_id.trim().is_empty() {
            return Err(PrismError::config("profile field 'accessKeyId' is empty"));
        }
        if self.secret_access_key.trim().is_empty() {
            return Err(PrismError::config("profile field 'secretAccessKey' is empty"));
        }
        if self.bucket_name.trim().is_empty() {
            return Err(PrismError::config("profile field 'bucketName' is empty"));
        }
        Ok(())
    }
}

/// Persistent store for connection profiles and the active-profile pointer
#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    /// Open the store in the default config directory
    pub fn open_default() -> Result<Self> {
        Ok(Self { root: Settings::config_dir()? })
    }

    /// Open the store rooted at an explicit directory
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    fn profiles_path(&self) -> PathBuf {
        self.root.join(PROFILES_FILE)
    }

    fn active_path(&self) -> PathBuf {
        self.root.join(ACTIVE_FILE)
    }

    pub async fn load_profiles(&self) -> Result<Vec<ConnectionProfile>> {
        let path = self.profiles_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = tokio::fs::read_to_string(&path).await?;
        let profiles = serde_json::from_str::<Vec<ConnectionProfile>>(&contents)
            .map_err(|e| PrismError::config(format!("invalid profile store: {e}")))?;
        Ok(profiles)
    }

    async fn write_profiles(&self, profiles: &[ConnectionProfile]) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let contents = serde_json::to_string_pretty(profiles)?;
        tokio::fs::write(self.profiles_path(), contents).await?;
        Ok(())
    }

    /// Insert or replace a profile by id
    ///
    /// The first profile saved into an empty store becomes active, and
    /// re-saving the active profile keeps it active.
    pub async fn save_profile(&self, profile: ConnectionProfile) -> Result<()> {
        profile.validate()?;

        let mut profiles = self.load_profiles().await?;
        let id = profile.id.clone();
        profiles.retain(|p| p.id != id);
        profiles.push(profile);
        self.write_profiles(&profiles).await?;

        match self.active_profile_id().await {
            Some(active) if active != id => {}
            _ => self.set_active(&id).await?,
        }
        Ok(())
    }

    /// Remove a profile; clears the active pointer if it pointed here
    pub async fn delete_profile(&self, id: &str) -> Result<bool> {
        let mut profiles = self.load_profiles().await?;
        let before = profiles.len();
        profiles.retain(|p| p.id != id);
        if profiles.len() == before {
            return Ok(false);
        }
        self.write_profiles(&profiles).await?;

        if self.active_profile_id().await.as_deref() == Some(id) {
            let _ = tokio::fs::remove_file(self.active_path()).await;
        }
        Ok(true)
    }

    pub async fn active_profile_id(&self) -> Option<String> {
        match tokio::fs::read_to_string(self.active_path()).await {
            Ok(contents) => {
                let id = contents.trim().to_string();
                if id.is_empty() {
                    None
                } else {
                    Some(id)
                }
            }
            Err(_) => None,
        }
    }

    /// Point the store at an existing profile
    pub async fn set_active(&self, id: &str) -> Result<()> {
        let profiles = self.load_profiles().await?;
        if !profiles.iter().any(|p| p.id == id) {
            return Err(PrismError::config(format!("no profile with id '{id}'")));
        }
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.active_path(), id).await?;
        Ok(())
    }

    pub async fn active_profile(&self) -> Result<Option<ConnectionProfile>> {
        let Some(id) = self.active_profile_id().await else {
            return Ok(None);
        };
        let profiles = self.load_profiles().await?;
        Ok(profiles.into_iter().find(|p| p.id == id))
    }

    /// Look a profile up by id first, then by display name
    pub async fn find_profile(&self, needle: &str) -> Result<Option<ConnectionProfile>> {
        let profiles = self.load_profiles().await?;
        Ok(profiles
            .iter()
            .find(|p| p.id == needle)
            .or_else(|| profiles.iter().find(|p| p.name == needle))
            .cloned())
    }

    /// Replace the stored profile list with validated entries from
    /// untyped JSON (remote config sync, file import)
    ///
    /// The active pointer survives when its profile is still present;
    /// otherwise the first default-flagged profile is promoted.
    pub async fn import_profiles(
        &self,
        values: &[serde_json::Value],
    ) -> Result<Vec<ConnectionProfile>> {
        let mut imported = Vec::with_capacity(values.len());
        for value in values {
            imported.push(ConnectionProfile::from_json_value(value)?);
        }

        self.write_profiles(&imported).await?;

        let active = self.active_profile_id().await;
        let active_still_present =
            active.as_ref().map_or(false, |id| imported.iter().any(|p| &p.id == id));
        if !active_still_present {
            let _ = tokio::fs::remove_file(self.active_path()).await;
            if let Some(default) = imported.iter().find(|p| p.is_default) {
                self.set_active(&default.id).await?;
            }
            debug!("active profile reset after import");
        }

        Ok(imported)
    }

    /// Onboarding-skip marker, set once the welcome flow has been shown
    pub async fn mark_onboarding_seen(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(SKIP_GUIDE_FILE), "true").await?;
        Ok(())
    }

    pub async fn onboarding_seen(&self) -> bool {
        self.root.join(SKIP_GUIDE_FILE).exists()
    }
}
