//! Key Store Integration Tests

use keyward_keys::{KeyParams, KeyStore, Secret};
use tempfile::TempDir;

async fn empty_store() -> (KeyStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = KeyStore::create_or_open(temp_dir.path()).await.unwrap();
    (store, temp_dir)
}

#[tokio::test]
async fn test_tampered_secret_is_invalid_but_readable() {
    let (store, _temp_dir) = empty_store().await;
    let secret = Secret::generate(32).unwrap();

    store
        .add_key("alpha", &secret, KeyParams::new())
        .await
        .unwrap()
        .expect("name is free");
    assert!(store
        .get_key_unchecked("alpha")
        .unwrap()
        .is_valid()
        .await
        .unwrap());

    // Flip one byte on disk
    let record = store.get_key_unchecked("alpha").unwrap();
    let mut bytes = std::fs::read(record.path()).unwrap();
    bytes[0] ^= 0xff;
    std::fs::write(record.path(), &bytes).unwrap();

    assert!(!record.is_valid().await.unwrap());
    assert!(store.get_key("alpha").await.unwrap().is_none());
    assert_eq!(
        record.secret().await.unwrap().unwrap().raw(),
        bytes.as_slice()
    );
}

#[tokio::test]
async fn test_add_key_twice_keeps_first() {
    let (store, _temp_dir) = empty_store().await;
    let first = Secret::generate(32).unwrap();
    let second = Secret::generate(32).unwrap();

    assert!(store
        .add_key("alpha", &first, KeyParams::new())
        .await
        .unwrap()
        .is_some());
    assert!(store
        .add_key("alpha", &second, KeyParams::new())
        .await
        .unwrap()
        .is_none());

    let record = store.get_key("alpha").await.unwrap().unwrap();
    assert_eq!(record.secret().await.unwrap(), Some(first.clone()));
    assert_eq!(record.sha256_hex().await.unwrap(), Some(first.sha256_hex()));
}

#[tokio::test]
async fn test_set_key_replaces_valid_and_invalid_keys() {
    let (store, _temp_dir) = empty_store().await;
    store
        .add_key("alpha", &Secret::generate(32).unwrap(), KeyParams::new())
        .await
        .unwrap();

    let replacement = Secret::generate(32).unwrap();
    store
        .set_key("alpha", &replacement, KeyParams::new())
        .await
        .unwrap();
    let record = store.get_key("alpha").await.unwrap().unwrap();
    assert_eq!(record.secret().await.unwrap(), Some(replacement));

    // Invalid record: secret with no sidecar
    std::fs::write(store.root().join("beta.key"), b"orphan").unwrap();
    assert!(store.get_key("beta").await.unwrap().is_none());
    let restored = Secret::generate(16).unwrap();
    store
        .set_key("beta", &restored, KeyParams::new())
        .await
        .unwrap();
    let record = store.get_key("beta").await.unwrap().unwrap();
    assert_eq!(record.secret().await.unwrap(), Some(restored));
}

#[tokio::test]
async fn test_valid_keys_is_subset_of_all_keys() {
    let (store, _temp_dir) = empty_store().await;
    for name in ["a", "b", "c"] {
        store
            .add_key(name, &Secret::generate(32).unwrap(), KeyParams::new())
            .await
            .unwrap();
    }
    // Corrupt metadata on one, remove the sidecar of another
    let b = store.get_key_unchecked("b").unwrap();
    std::fs::write(b.params_path(), b"garbage").unwrap();
    let c = store.get_key_unchecked("c").unwrap();
    std::fs::remove_file(c.params_path()).unwrap();

    let all: Vec<String> = store
        .all_keys()
        .await
        .unwrap()
        .iter()
        .map(|k| k.name())
        .collect();
    let valid: Vec<String> = store
        .valid_keys()
        .await
        .unwrap()
        .iter()
        .map(|k| k.name())
        .collect();

    assert_eq!(all, vec!["a", "b", "c"]);
    assert_eq!(valid, vec!["a"]);
    assert!(valid.iter().all(|name| all.contains(name)));
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let secret = Secret::generate(32).unwrap();
    {
        let store = KeyStore::create_or_open(temp_dir.path()).await.unwrap();
        let mut params = KeyParams::new();
        params.insert("zfs_dataset".to_string(), "tank/a".into());
        store.add_key("alpha", &secret, params).await.unwrap();
    }

    let store = KeyStore::open(temp_dir.path()).await.unwrap().unwrap();
    let record = store.get_key("alpha").await.unwrap().unwrap();
    assert_eq!(record.secret().await.unwrap(), Some(secret));
    assert_eq!(
        record.params().await.unwrap().get("zfs_dataset"),
        Some(&serde_json::Value::from("tank/a"))
    );
}
