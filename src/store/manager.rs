//! Store connection manager
//!
//! Owns the single active low-level client. Initializing from a profile
//! replaces the whole connection slot; requests issued against the old
//! slot are not cancelled, their results are simply tagged with the old
//! profile id and discarded by callers.

use crate::config::ConnectionProfile;
use crate::error::{PrismError, Result};
use crate::store::models::{ListingPage, ObjectEntry};
use aws_config::Region;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Builder as S3ConfigBuilder};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Runtime binding of one profile to an initialized client
#[derive(Debug, Clone)]
pub(crate) struct ActiveConnection {
    pub profile_id: String,
    pub bucket: String,
    pub account_id: String,
    pub custom_domain: Option<String>,
    pub client: Client,
}

/// Manager holding at most one active connection
#[derive(Debug, Default)]
pub struct StoreManager {
    active: RwLock<Option<ActiveConnection>>,
}

/// Endpoint for a profile: the explicit override, or the account-derived
/// store endpoint
pub fn compute_endpoint(profile: &ConnectionProfile) -> Result<String> {
    if let Some(endpoint) = profile
        .endpoint
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
    {
        return Ok(endpoint.to_string());
    }

    let account_id = profile.account_id.trim();
    if account_id.is_empty() {
        return Err(PrismError::config(
            "profile needs an account id or an explicit endpoint",
        ));
    }
    Ok(format!("https://{account_id}.r2.cloudflarestorage.com"))
}

/// Public URL for a key: custom domain when configured (trailing slash
/// stripped), otherwise the direct-to-store URL
pub fn public_url(bucket: &str, account_id: &str, custom_domain: Option<&str>, key: &str) -> String {
    match custom_domain.map(str::trim).filter(|d| !d.is_empty()) {
        Some(domain) => format!("{}/{}", domain.trim_end_matches('/'), key),
        None => format!("https://{bucket}.{account_id}.r2.cloudflarestorage.com/{key}"),
    }
}

/// Fold per-key delete failures into one aggregate error naming each
/// failed key, or `None` when everything succeeded
pub fn aggregate_delete_failure(
    total: usize,
    failures: Vec<(String, PrismError)>,
) -> Option<PrismError> {
    if failures.is_empty() {
        return None;
    }
    let detail = failures
        .iter()
        .map(|(key, err)| format!("{key} ({err})"))
        .collect::<Vec<_>>()
        .join("; ");
    Some(PrismError::remote(format!(
        "bulk delete failed for {} of {total} keys: {detail}",
        failures.len()
    )))
}

impl StoreManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a profile: validates it, builds a fresh client and replaces
    /// any previous connection atomically
    pub async fn initialize(&self, profile: &ConnectionProfile) -> Result<()> {
        profile.validate()?;
        let endpoint = compute_endpoint(profile)?;

        let credentials = Credentials::new(
            profile.access_key_id.trim(),
            profile.secret_access_key.trim(),
            None,
            None,
            "prism-static",
        );

        let config = S3ConfigBuilder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .endpoint_url(&endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let connection = ActiveConnection {
            profile_id: profile.id.clone(),
            bucket: profile.bucket_name.trim().to_string(),
            account_id: profile.account_id.trim().to_string(),
            custom_domain: profile.custom_domain.clone(),
            client: Client::from_conf(config),
        };

        info!(endpoint = %endpoint, bucket = %connection.bucket, "store connection initialized");
        *self.active.write().await = Some(connection);
        Ok(())
    }

    /// Drop the active connection, if any
    pub async fn disconnect(&self) {
        *self.active.write().await = None;
    }

    /// Profile id of the active connection
    pub async fn profile_id(&self) -> Option<String> {
        self.active.read().await.as_ref().map(|c| c.profile_id.clone())
    }

    pub(crate) async fn connection(&self) -> Result<ActiveConnection> {
        self.active
            .read()
            .await
            .clone()
            .ok_or(PrismError::NotInitialized)
    }

    /// Issue one paginated listing call
    ///
    /// `recursive` omits the delimiter, flattening all nested entries;
    /// otherwise common prefixes are grouped and reported as
    /// directories relative to `prefix`.
    pub async fn list_objects(
        &self,
        prefix: &str,
        recursive: bool,
        page_size: i32,
        cursor: Option<String>,
    ) -> Result<ListingPage> {
        let conn = self.connection().await?;

        let mut request = conn
            .client
            .list_objects_v2()
            .bucket(&conn.bucket)
            .prefix(prefix)
            .max_keys(page_size);
        if !recursive {
            request = request.delimiter("/");
        }
        if let Some(token) = cursor {
            request = request.continuation_token(token);
        }

        let output = request.send().await.map_err(|e| {
            PrismError::remote(format!("failed to list objects: {}", DisplayErrorContext(&e)))
        })?;

        let entries = output
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?.to_string();
                Some(ObjectEntry {
                    key,
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: obj.last_modified().and_then(|t| {
                        chrono::DateTime::from_timestamp(t.secs(), t.subsec_nanos())
                    }),
                })
            })
            .collect();

        let directories = output
            .common_prefixes()
            .iter()
            .filter_map(|cp| cp.prefix())
            .map(|p| p.strip_prefix(prefix).unwrap_or(p).trim_end_matches('/').to_string())
            .filter(|d| !d.is_empty())
            .collect();

        Ok(ListingPage {
            profile_id: conn.profile_id,
            entries,
            directories,
            cursor: output.next_continuation_token().map(str::to_string),
        })
    }

    /// Delete a single object
    pub async fn delete_object(&self, key: &str) -> Result<()> {
        let conn = self.connection().await?;

        conn.client
            .delete_object()
            .bucket(&conn.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                PrismError::remote(format!(
                    "failed to delete '{key}': {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        debug!(key, "object deleted");
        Ok(())
    }

    /// Delete many objects as a parallel fan-out of individual deletes
    ///
    /// Deletion is not transactional: acknowledged deletes are not rolled
    /// back when others fail. Every outcome is collected and a single
    /// aggregate error names each failed key, so callers must re-list to
    /// learn which keys actually remain.
    pub async fn delete_objects(&self, keys: &[String]) -> Result<()> {
        // fail fast on a missing connection before spawning anything
        self.connection().await?;

        let results = join_all(keys.iter().map(|key| async move {
            self.delete_object(key).await.map_err(|e| (key.clone(), e))
        }))
        .await;

        let failures: Vec<(String, PrismError)> =
            results.into_iter().filter_map(|r| r.err()).collect();
        match aggregate_delete_failure(keys.len(), failures) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Public URL for a key on the active connection; no network call
    pub async fn get_public_url(&self, key: &str) -> Result<String> {
        let conn = self.connection().await?;
        Ok(public_url(
            &conn.bucket,
            &conn.account_id,
            conn.custom_domain.as_deref(),
            key,
        ))
    }
}
