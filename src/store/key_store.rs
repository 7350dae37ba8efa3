use crate::store::auth_store::AuthStateStore;
use async_trait::async_trait;
use authcore::Value;
use authcore::store::error::Result;
use authcore::store::records::{KeyId, RecordType};
use authcore::store::traits::KeyStore;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// [`KeyStore`] bound to one session. Cheap to clone; every call is a
/// round trip to the backing store.
#[derive(Clone)]
pub struct SessionKeyStore {
    store: Arc<AuthStateStore>,
    session_id: String,
}

impl SessionKeyStore {
    pub fn new(store: Arc<AuthStateStore>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn transaction(&self) -> KeyTransaction<'_, Self> {
        KeyTransaction::new(self)
    }
}

#[async_trait]
impl KeyStore for SessionKeyStore {
    async fn get(&self, record_type: RecordType, ids: &[String]) -> Result<HashMap<String, Value>> {
        self.store.get_keys(&self.session_id, record_type, ids).await
    }

    async fn set(&self, updates: Vec<(KeyId, Option<Value>)>) -> Result<()> {
        self.store.set_keys(&self.session_id, updates).await
    }
}

/// A unit of protocol work over a [`KeyStore`].
///
/// Reads are fetched once and cached, writes are buffered and land in a
/// single `set` on [`commit`](Self::commit). Dropping the transaction
/// discards buffered writes.
pub struct KeyTransaction<'a, S: KeyStore + ?Sized> {
    store: &'a S,
    fetched: HashMap<KeyId, Option<Value>>,
    pending: BTreeMap<KeyId, Option<Value>>,
}

impl<'a, S: KeyStore + ?Sized> KeyTransaction<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            fetched: HashMap::new(),
            pending: BTreeMap::new(),
        }
    }

    pub async fn get(&mut self, record_type: RecordType, ids: &[String]) -> Result<HashMap<String, Value>> {
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| {
                let key = KeyId::new(record_type, id.as_str());
                !self.pending.contains_key(&key) && !self.fetched.contains_key(&key)
            })
            .cloned()
            .collect();

        if !missing.is_empty() {
            let mut loaded = self.store.get(record_type, &missing).await?;
            for id in missing {
                let value = loaded.remove(&id);
                self.fetched.insert(KeyId::new(record_type, id), value);
            }
        }

        let mut result = HashMap::with_capacity(ids.len());
        for id in ids {
            let key = KeyId::new(record_type, id.as_str());
            let value = match self.pending.get(&key) {
                Some(pending) => pending.as_ref(),
                None => self.fetched.get(&key).and_then(Option::as_ref),
            };
            if let Some(value) = value {
                result.insert(id.clone(), value.clone());
            }
        }
        Ok(result)
    }

    pub fn set(&mut self, key: KeyId, value: Value) {
        self.pending.insert(key, Some(value));
    }

    pub fn delete(&mut self, key: KeyId) {
        self.pending.insert(key, None);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub async fn commit(self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.store.set(self.pending.into_iter().collect()).await
    }
}
