//! Integration tests for the credential store
//!
//! Profiles must round-trip field-for-field, the active pointer must
//! follow the lifecycle rules, and untyped JSON input must pass the
//! validated construction step.

use prism::config::{ConnectionProfile, ProfileStore};
use prism::error::PrismError;
use serde_json::json;
use tempfile::TempDir;

fn sample(id: &str, name: &str) -> ConnectionProfile {
    ConnectionProfile {
        id: id.to_string(),
        name: name.to_string(),
        account_id: "acct123".to_string(),
        access_key_id: "AKIAEXAMPLE".to_string(),
        secret_access_key: "s3cr3t".to_string(),
        bucket_name: "assets".to_string(),
        endpoint: None,
        custom_domain: Some("https://cdn.example.com".to_string()),
        is_default: false,
    }
}

#[tokio::test]
async fn test_profile_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::with_root(dir.path().to_path_buf());

    let profile = sample("p1", "primary");
    store.save_profile(profile.clone()).await.unwrap();

    let loaded = store.load_profiles().await.unwrap();
    assert_eq!(loaded, vec![profile]);
}

#[tokio::test]
async fn test_first_profile_becomes_active() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::with_root(dir.path().to_path_buf());

    store.save_profile(sample("p1", "one")).await.unwrap();
    assert_eq!(store.active_profile_id().await.as_deref(), Some("p1"));

    // a second profile does not steal the active slot
    store.save_profile(sample("p2", "two")).await.unwrap();
    assert_eq!(store.active_profile_id().await.as_deref(), Some("p1"));
}

#[tokio::test]
async fn test_save_replaces_by_id() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::with_root(dir.path().to_path_buf());

    store.save_profile(sample("p1", "before")).await.unwrap();
    store.save_profile(sample("p1", "after")).await.unwrap();

    let loaded = store.load_profiles().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].name, "after");
}

#[tokio::test]
async fn test_deleting_active_profile_clears_pointer() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::with_root(dir.path().to_path_buf());

    store.save_profile(sample("p1", "one")).await.unwrap();
    store.save_profile(sample("p2", "two")).await.unwrap();
    store.set_active("p2").await.unwrap();

    assert!(store.delete_profile("p2").await.unwrap());
    assert_eq!(store.active_profile_id().await, None);

    // deleting a non-active profile leaves the pointer alone
    store.set_active("p1").await.unwrap();
    assert!(!store.delete_profile("ghost").await.unwrap());
    assert_eq!(store.active_profile_id().await.as_deref(), Some("p1"));
}

#[tokio::test]
async fn test_set_active_rejects_unknown_id() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::with_root(dir.path().to_path_buf());

    store.save_profile(sample("p1", "one")).await.unwrap();
    assert!(matches!(
        store.set_active("ghost").await,
        Err(PrismError::ConfigError(_))
    ));
}

#[tokio::test]
async fn test_find_profile_by_id_or_name() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::with_root(dir.path().to_path_buf());

    store.save_profile(sample("p1", "primary")).await.unwrap();
    assert!(store.find_profile("p1").await.unwrap().is_some());
    assert!(store.find_profile("primary").await.unwrap().is_some());
    assert!(store.find_profile("nope").await.unwrap().is_none());
}

#[test]
fn test_validated_construction_names_missing_field() {
    let value = json!({
        "id": "r1",
        "name": "remote",
        "accountId": "acct",
        "secretAccessKey": "sk",
        "bucketName": "assets"
    });
    let err = ConnectionProfile::from_json_value(&value).unwrap_err();
    assert!(err.to_string().contains("accessKeyId"), "got: {err}");
}

#[test]
fn test_validated_construction_requires_account_or_endpoint() {
    let value = json!({
        "accessKeyId": "ak",
        "secretAccessKey": "sk",
        "bucketName": "assets"
    });
    let err = ConnectionProfile::from_json_value(&value).unwrap_err();
    assert!(err.to_string().contains("accountId"), "got: {err}");

    let with_endpoint = json!({
        "accessKeyId": "ak",
        "secretAccessKey": "sk",
        "bucketName": "assets",
        "endpoint": "https://s3.example.com"
    });
    assert!(ConnectionProfile::from_json_value(&with_endpoint).is_ok());
}

#[test]
fn test_validated_construction_coerces_id_and_name() {
    let value = json!({
        "accountId": "acct",
        "accessKeyId": "ak",
        "secretAccessKey": "sk",
        "bucketName": "assets"
    });
    let profile = ConnectionProfile::from_json_value(&value).unwrap();
    assert!(!profile.id.is_empty());
    assert_eq!(profile.name, "assets");
}

#[test]
fn test_validated_construction_trims_whitespace() {
    let value = json!({
        "accountId": "  acct  ",
        "accessKeyId": " ak ",
        "secretAccessKey": " sk ",
        "bucketName": " assets "
    });
    let profile = ConnectionProfile::from_json_value(&value).unwrap();
    assert_eq!(profile.account_id, "acct");
    assert_eq!(profile.bucket_name, "assets");

    let blank = json!({
        "accountId": "acct",
        "accessKeyId": "   ",
        "secretAccessKey": "sk",
        "bucketName": "assets"
    });
    assert!(ConnectionProfile::from_json_value(&blank).is_err());
}

#[tokio::test]
async fn test_import_replaces_list_and_promotes_default() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::with_root(dir.path().to_path_buf());

    store.save_profile(sample("local", "local")).await.unwrap();
    assert_eq!(store.active_profile_id().await.as_deref(), Some("local"));

    let values = vec![
        json!({
            "id": "r1", "name": "remote one", "accountId": "acct",
            "accessKeyId": "ak", "secretAccessKey": "sk", "bucketName": "b1"
        }),
        json!({
            "id": "r2", "name": "remote two", "accountId": "acct",
            "accessKeyId": "ak", "secretAccessKey": "sk", "bucketName": "b2",
            "isDefault": true
        }),
    ];
    let imported = store.import_profiles(&values).await.unwrap();
    assert_eq!(imported.len(), 2);

    // the old active profile is gone, so the default-flagged one wins
    assert_eq!(store.active_profile_id().await.as_deref(), Some("r2"));
    assert_eq!(store.load_profiles().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_import_keeps_surviving_active() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::with_root(dir.path().to_path_buf());

    store.save_profile(sample("r1", "one")).await.unwrap();

    let values = vec![
        json!({
            "id": "r1", "name": "one", "accountId": "acct",
            "accessKeyId": "ak", "secretAccessKey": "sk", "bucketName": "b1"
        }),
        json!({
            "id": "r2", "name": "two", "accountId": "acct",
            "accessKeyId": "ak", "secretAccessKey": "sk", "bucketName": "b2",
            "isDefault": true
        }),
    ];
    store.import_profiles(&values).await.unwrap();
    assert_eq!(store.active_profile_id().await.as_deref(), Some("r1"));
}

#[tokio::test]
async fn test_onboarding_flag() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::with_root(dir.path().to_path_buf());

    assert!(!store.onboarding_seen().await);
    store.mark_onboarding_seen().await.unwrap();
    assert!(store.onboarding_seen().await);
}
