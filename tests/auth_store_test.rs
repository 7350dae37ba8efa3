mod common;

use authcore::Value;
use authcore::store::records::{KeyId, RecordType};
use authcore::store::traits::Backend;
use authcore::types::session::ConnectionStatus;
use common::{Pairing, StubTransport, credentials, initial_keys, pre_key_record};
use std::sync::Arc;
use whatsapp_session::session::SessionManager;
use whatsapp_session::store::{AuthBlobStore, AuthStateStore, FileStore, InMemoryBackend, KeyStore};
use whatsapp_session::SessionConfig;

fn ids(range: std::ops::RangeInclusive<u32>) -> Vec<String> {
    range.map(|i| i.to_string()).collect()
}

#[tokio::test]
async fn test_load_save_load_is_idempotent() {
    let store = AuthStateStore::new(Arc::new(InMemoryBackend::new()));
    store.save_credentials("s1", credentials()).await.unwrap();
    store.set_keys("s1", initial_keys(4)).await.unwrap();

    let first = store.load("s1").await.unwrap();
    store
        .save_credentials("s1", first.credentials.clone())
        .await
        .unwrap();
    let second = store.load("s1").await.unwrap();
    assert_eq!(first, second);
}

async fn concurrent_disjoint_writes(backend: Arc<dyn Backend>) {
    let store = Arc::new(AuthStateStore::new(backend));

    let left: Vec<_> = (1..=20)
        .map(|i| (KeyId::new(RecordType::PreKey, i.to_string()), Some(pre_key_record())))
        .collect();
    let right: Vec<_> = (21..=40)
        .map(|i| (KeyId::new(RecordType::PreKey, i.to_string()), Some(pre_key_record())))
        .collect();

    let (a, b) = tokio::join!(store.set_keys("s1", left), store.set_keys("s1", right));
    a.unwrap();
    b.unwrap();

    let found = store
        .get_keys("s1", RecordType::PreKey, &ids(1..=40))
        .await
        .unwrap();
    assert_eq!(found.len(), 40);
}

#[tokio::test]
async fn test_concurrent_set_keys_in_memory() {
    concurrent_disjoint_writes(Arc::new(InMemoryBackend::new())).await;
}

#[tokio::test]
async fn test_concurrent_set_keys_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = FileStore::new(dir.path()).await.expect("open store");
    concurrent_disjoint_writes(Arc::new(backend)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_writers_lose_nothing() {
    let store = Arc::new(AuthStateStore::new(Arc::new(InMemoryBackend::new())));
    let mut handles = Vec::new();
    for writer in 0..8u32 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for n in 0..5u32 {
                let key = KeyId::new(RecordType::Session, format!("{writer}.{n}"));
                store
                    .set_keys("s1", vec![(key, Some(Value::Bytes(vec![writer as u8, n as u8])))])
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(
        store.key_count("s1", Some(RecordType::Session)).await.unwrap(),
        40
    );
}

#[tokio::test]
async fn test_sessions_are_partitioned() {
    let store = AuthStateStore::new(Arc::new(InMemoryBackend::new()));
    store.set_keys("a", initial_keys(2)).await.unwrap();
    store.set_keys("b", initial_keys(5)).await.unwrap();

    store.clear("a").await.unwrap();
    assert_eq!(store.key_count("a", None).await.unwrap(), 0);
    assert_eq!(store.key_count("b", Some(RecordType::PreKey)).await.unwrap(), 5);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let id;
    let pre_key;
    {
        let transport = Arc::new(StubTransport::new(Pairing::Qr("qr".to_string())));
        let backend = FileStore::new(dir.path()).await.expect("open store");
        let manager = SessionManager::new(Arc::new(backend), transport.clone(), SessionConfig::default());

        id = manager.get_or_create("owner").await.unwrap().id;
        manager.connect(&id, "27821234567").await.unwrap();

        let keys = transport.key_store().expect("engine received a key store");
        pre_key = pre_key_record();
        keys.set(vec![(KeyId::new(RecordType::PreKey, "7"), Some(pre_key.clone()))])
            .await
            .unwrap();
    }

    let backend = FileStore::new(dir.path()).await.expect("reopen store");
    let manager = SessionManager::new(
        Arc::new(backend),
        Arc::new(StubTransport::new(Pairing::Refuse)),
        SessionConfig::default(),
    );
    let status = manager.get_status(&id).await.unwrap();
    assert_eq!(status.connection_status, ConnectionStatus::QrPending);
    assert_eq!(status.qr_code.as_deref(), Some("qr"));
    assert_eq!(manager.get_or_create("owner").await.unwrap().id, id);

    let found = manager
        .auth_store()
        .get_keys(&id, RecordType::PreKey, &["7".to_string()])
        .await
        .unwrap();
    let record = &found["7"];
    assert_eq!(record, &pre_key);
    assert_eq!(record.get("public").and_then(Value::as_bytes).map(<[u8]>::len), Some(33));
    assert_eq!(record.get("private").and_then(Value::as_bytes).map(<[u8]>::len), Some(32));
}

#[tokio::test]
async fn test_unknown_record_groups_survive_rewrites() {
    let backend = InMemoryBackend::new();
    backend
        .store_auth_state(
            "s1",
            r#"{"creds":{},"keys":{"future-record":{"x":{"v":1}}}}"#,
        )
        .await
        .unwrap();

    let store = AuthStateStore::new(Arc::new(backend.clone()));
    store.set_keys("s1", initial_keys(1)).await.unwrap();

    let text = backend.load_auth_state("s1").await.unwrap().expect("blob stored");
    assert!(text.contains("future-record"));
    assert_eq!(store.key_count("s1", None).await.unwrap(), 2);
}
