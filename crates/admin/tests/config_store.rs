//! Operator config store tests

use std::fs;

use perp_admin::config::{ConfigKey, DEFAULT_KEYPAIR, DEFAULT_URL};
use perp_admin::{AdminError, ConfigOverrides, ConfigStore, EffectiveConfig, Network};
use tempfile::TempDir;

fn store_in(dir: &TempDir) -> ConfigStore {
    ConfigStore::new(dir.path().join("perp-admin").join("config.json"))
}

#[test]
fn test_get_before_init_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    let err = store.get().unwrap_err();
    assert!(matches!(err, AdminError::ConfigMissing { .. }));
    assert!(err.to_string().contains("config init"));
    assert!(!dir.path().join("perp-admin").exists());
}

#[test]
fn test_init_writes_defaults() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    store.init().unwrap();
    let config = store.get().unwrap();
    assert_eq!(config.network, Some(Network::Devnet));
    assert_eq!(config.url.as_deref(), Some(DEFAULT_URL));
    assert_eq!(config.keypair.as_deref(), Some(DEFAULT_KEYPAIR));

    let raw = fs::read_to_string(store.path()).unwrap();
    assert!(raw.contains("\"devnet\""));
}

#[test]
fn test_init_overwrites_without_merge() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    store.init().unwrap();
    store.set("url", "http://127.0.0.1:8899").unwrap();
    store.set("network", "localnet").unwrap();
    assert_eq!(store.get().unwrap().network, Some(Network::Localnet));

    store.init().unwrap();
    let config = store.get().unwrap();
    assert_eq!(config.network, Some(Network::Devnet));
    assert_eq!(config.url.as_deref(), Some(DEFAULT_URL));
}

#[test]
fn test_set_rejects_unknown_key_and_leaves_file() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    store.init().unwrap();
    let before = fs::read_to_string(store.path()).unwrap();

    let err = store.set("rpc", "http://x").unwrap_err();
    assert!(matches!(err, AdminError::InvalidKey(ref k) if k == "rpc"));
    assert!(matches!(
        store.set("network", "moonnet"),
        Err(AdminError::InvalidValue { .. })
    ));
    assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
}

#[test]
fn test_set_before_init() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    assert!(matches!(
        store.set("url", "http://x"),
        Err(AdminError::ConfigMissing { .. })
    ));
    assert!(!store.path().exists());
}

#[test]
fn test_malformed_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    store.init().unwrap();
    fs::write(store.path(), "{ not json").unwrap();
    assert!(matches!(store.get(), Err(AdminError::ConfigFormat { .. })));
}

#[test]
fn test_newer_version_still_loads() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    store.init().unwrap();
    fs::write(
        store.path(),
        r#"{ "version": 9, "network": "testnet", "url": "https://api.testnet.solana.com", "future": true }"#,
    )
    .unwrap();

    let config = store.get().unwrap();
    assert_eq!(config.version, 9);
    assert_eq!(config.network, Some(Network::Testnet));
    assert_eq!(config.keypair, None);
}

#[test]
fn test_overrides_fill_partial_profile() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    store.init().unwrap();
    fs::write(store.path(), r#"{ "version": 1, "network": "devnet" }"#).unwrap();
    let stored = store.load_optional().unwrap();

    let err = EffectiveConfig::resolve(stored.as_ref(), &ConfigOverrides::default()).unwrap_err();
    assert!(matches!(err, AdminError::MissingSetting(ConfigKey::Url)));

    let overrides = ConfigOverrides {
        url: Some("http://127.0.0.1:8899".to_string()),
        keypair: Some("/tmp/operator.json".to_string()),
        ..Default::default()
    };
    let effective = EffectiveConfig::resolve(stored.as_ref(), &overrides).unwrap();
    assert_eq!(effective.network, Network::Devnet);
    assert_eq!(effective.url, "http://127.0.0.1:8899");
}
