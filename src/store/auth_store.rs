use crate::store::key_store::SessionKeyStore;
use authcore::Value;
use authcore::store::auth_state::{AuthState, UnknownGroups};
use authcore::store::error::Result;
use authcore::store::records::{KeyId, RecordType};
use authcore::store::traits::Backend;
use authcore::store::validate::{self, MalformedKeyRecord};
use dashmap::DashMap;
use log::debug;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Durable auth material for every session, keyed by session id.
///
/// Holds no key data between calls: each operation reads from (and writes
/// back to) the backend, so a restart between two calls loses nothing but
/// a write that never returned. Writes to one session are serialized
/// in-process; different sessions never contend.
pub struct AuthStateStore {
    backend: Arc<dyn Backend>,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AuthStateStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            write_locks: DashMap::new(),
        }
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    /// A `KeyStore` bound to `session_id`, for the protocol engine.
    pub fn key_store(self: &Arc<Self>, session_id: &str) -> SessionKeyStore {
        SessionKeyStore::new(self.clone(), session_id)
    }

    /// Loads the full auth state. A session that never stored anything gets
    /// an empty state. Every record is validated; problems are logged and
    /// the (possibly repaired) records are returned regardless.
    pub async fn load(&self, session_id: &str) -> Result<AuthState> {
        let (state, _) = self.read_state(session_id).await?;
        let credentials = validate::validate_credentials(session_id, state.credentials).value;
        let keys = state
            .keys
            .into_iter()
            .map(|(key, value)| {
                let validated = validate::validate_record(session_id, &key, value);
                (key, validated.value)
            })
            .collect();
        Ok(AuthState { credentials, keys })
    }

    pub async fn get_keys(
        &self,
        session_id: &str,
        record_type: RecordType,
        ids: &[String],
    ) -> Result<HashMap<String, Value>> {
        let (mut state, _) = self.read_state(session_id).await?;
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            let key = KeyId::new(record_type, id.clone());
            if let Some(value) = state.keys.remove(&key) {
                let validated = validate::validate_record(session_id, &key, value);
                found.insert(id.clone(), validated.value);
            }
        }
        debug!(
            "get_keys session={} type={} requested={} found={}",
            session_id,
            record_type,
            ids.len(),
            found.len()
        );
        Ok(found)
    }

    /// Applies every update in one write. `None` deletes the record.
    pub async fn set_keys(&self, session_id: &str, updates: Vec<(KeyId, Option<Value>)>) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        self.with_write_lock(session_id, async move {
            let (mut state, unknown) = self.read_state(session_id).await?;
            let count = updates.len();
            state.apply(updates);
            self.write_state(session_id, &state, &unknown).await?;
            debug!(
                "set_keys session={} updates={} total={}",
                session_id,
                count,
                state.key_count(None)
            );
            Ok(())
        })
        .await
    }

    pub async fn save_credentials(&self, session_id: &str, credentials: Value) -> Result<()> {
        self.with_write_lock(session_id, async move {
            let (mut state, unknown) = self.read_state(session_id).await?;
            state.credentials = credentials;
            self.write_state(session_id, &state, &unknown).await
        })
        .await
    }

    /// Removes credentials and every key record. The session row is untouched.
    pub async fn clear(&self, session_id: &str) -> Result<()> {
        self.with_write_lock(session_id, async move {
            self.backend.delete_auth_state(session_id).await?;
            debug!("Cleared auth state for session {}", session_id);
            Ok(())
        })
        .await
    }

    pub async fn key_count(&self, session_id: &str, record_type: Option<RecordType>) -> Result<usize> {
        let (state, _) = self.read_state(session_id).await?;
        Ok(state.key_count(record_type))
    }

    /// Validates credentials and every stored record, returning all problems.
    pub async fn check_keys(&self, session_id: &str) -> Result<Vec<MalformedKeyRecord>> {
        let (state, _) = self.read_state(session_id).await?;
        let mut problems = validate::validate_credentials(session_id, state.credentials).problems;
        for (key, value) in state.keys {
            problems.extend(validate::validate_record(session_id, &key, value).problems);
        }
        Ok(problems)
    }

    /// Runs `write` while holding the session's write lock. The lock entry is
    /// dropped again once nobody holds or waits on it.
    async fn with_write_lock<T>(&self, session_id: &str, write: impl Future<Output = Result<T>>) -> Result<T> {
        let lock = self
            .write_locks
            .entry(session_id.to_string())
            .or_default()
            .clone();
        let result = {
            let _guard = lock.lock().await;
            write.await
        };
        drop(lock);
        self.write_locks
            .remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn read_state(&self, session_id: &str) -> Result<(AuthState, UnknownGroups)> {
        match self.backend.load_auth_state(session_id).await? {
            Some(text) => AuthState::decode_with_unknown(&text),
            None => Ok((AuthState::empty(), UnknownGroups::new())),
        }
    }

    async fn write_state(&self, session_id: &str, state: &AuthState, unknown: &UnknownGroups) -> Result<()> {
        let encoded = state.encode_preserving(unknown)?;
        self.backend.store_auth_state(session_id, &encoded).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryBackend;
    use authcore::store::traits::AuthBlobStore;
    use authcore::store::validate::Corruption;

    fn store() -> (Arc<AuthStateStore>, InMemoryBackend) {
        let backend = InMemoryBackend::new();
        (
            Arc::new(AuthStateStore::new(Arc::new(backend.clone()))),
            backend,
        )
    }

    fn pre_key(private_len: usize) -> Value {
        Value::from([
            ("public", Value::Bytes(vec![5; 33])),
            ("private", Value::Bytes(vec![7; private_len])),
        ])
    }

    #[tokio::test]
    async fn load_of_unknown_session_is_empty() {
        let (store, _) = store();
        let state = store.load("nobody").await.unwrap();
        assert_eq!(state, AuthState::empty());
    }

    #[tokio::test]
    async fn get_keys_skips_missing_ids() {
        let (store, _) = store();
        store
            .set_keys(
                "s1",
                vec![(KeyId::new(RecordType::PreKey, "1"), Some(pre_key(32)))],
            )
            .await
            .unwrap();

        let found = store
            .get_keys("s1", RecordType::PreKey, &["1".to_string(), "2".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["1"], pre_key(32));
    }

    #[tokio::test]
    async fn set_keys_deletes_on_none() {
        let (store, _) = store();
        let key = KeyId::new(RecordType::Session, "user.0");
        store
            .set_keys("s1", vec![(key.clone(), Some(Value::Bytes(vec![1])))])
            .await
            .unwrap();
        store.set_keys("s1", vec![(key, None)]).await.unwrap();
        assert_eq!(store.key_count("s1", None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn corrupt_pre_key_is_still_returned() {
        let (store, _) = store();
        store
            .set_keys(
                "s1",
                vec![(KeyId::new(RecordType::PreKey, "5"), Some(pre_key(31)))],
            )
            .await
            .unwrap();

        let found = store
            .get_keys("s1", RecordType::PreKey, &["5".to_string()])
            .await
            .unwrap();
        assert_eq!(found.get("5"), Some(&pre_key(31)));

        let problems = store.check_keys("s1").await.unwrap();
        assert_eq!(problems.len(), 1);
        assert!(matches!(
            problems[0].corruption,
            Corruption::WrongLength {
                observed: 31,
                expected: 32,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn legacy_shallow_blob_is_repaired_on_read() {
        let (store, backend) = store();
        // Inner buffers in the old Buffer JSON shape, two levels below the record root.
        let public: Vec<u8> = vec![5; 33];
        let private: Vec<u8> = vec![7; 32];
        let as_array = |b: &[u8]| {
            b.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(",")
        };
        let text = format!(
            r#"{{"creds":{{}},"keys":{{"pre-key":{{"1":{{"public":{{"type":"Buffer","data":[{}]}},"private":{{"type":"Buffer","data":[{}]}}}}}}}}}}"#,
            as_array(&public),
            as_array(&private)
        );
        backend.store_auth_state("s1", &text).await.unwrap();

        let found = store
            .get_keys("s1", RecordType::PreKey, &["1".to_string()])
            .await
            .unwrap();
        let record = &found["1"];
        assert_eq!(record.get("public").and_then(Value::as_bytes), Some(&public[..]));
        assert_eq!(record.get("private").and_then(Value::as_bytes), Some(&private[..]));
    }

    #[tokio::test]
    async fn credentials_update_keeps_keys() {
        let (store, _) = store();
        store
            .set_keys(
                "s1",
                vec![(KeyId::new(RecordType::PreKey, "1"), Some(pre_key(32)))],
            )
            .await
            .unwrap();
        store
            .save_credentials("s1", Value::from([("registrationId", Value::from(7u32))]))
            .await
            .unwrap();

        let state = store.load("s1").await.unwrap();
        assert_eq!(state.key_count(None), 1);
        assert_eq!(state.credentials.get("registrationId"), Some(&Value::from(7u32)));
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let (store, backend) = store();
        store
            .set_keys(
                "s1",
                vec![(KeyId::new(RecordType::PreKey, "1"), Some(pre_key(32)))],
            )
            .await
            .unwrap();
        store.clear("s1").await.unwrap();
        assert_eq!(backend.load_auth_state("s1").await.unwrap(), None);
        assert_eq!(store.load("s1").await.unwrap(), AuthState::empty());
    }

    #[tokio::test]
    async fn write_locks_do_not_accumulate() {
        let (store, _) = store();
        let (a, b) = tokio::join!(
            store.set_keys("s1", vec![(KeyId::new(RecordType::Session, "a"), Some(Value::Bytes(vec![1])))]),
            store.set_keys("s2", vec![(KeyId::new(RecordType::Session, "b"), Some(Value::Bytes(vec![2])))]),
        );
        a.unwrap();
        b.unwrap();
        store.save_credentials("s1", Value::object()).await.unwrap();
        store.clear("s2").await.unwrap();
        assert!(store.write_locks.is_empty());
    }
}
