use crate::store::error::Result;
use crate::store::records::{KeyId, RecordType};
use crate::value::Value;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Durable auth material of one session: long-term credentials plus every
/// protocol key record, addressed by `(record type, id)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuthState {
    pub credentials: Value,
    pub keys: BTreeMap<KeyId, Value>,
}

/// Persisted layout of [`AuthState`]. Keys are grouped by the record type's
/// wire name; groups with a name this build does not know are carried
/// through untouched so a newer writer's records are not lost.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AuthStateBlob {
    #[serde(default)]
    creds: Value,
    #[serde(default)]
    keys: BTreeMap<String, BTreeMap<String, Value>>,
}

impl AuthState {
    /// A never-paired session: empty credentials container, no keys.
    pub fn empty() -> Self {
        Self {
            credentials: Value::object(),
            keys: BTreeMap::new(),
        }
    }

    pub fn get(&self, record_type: RecordType, id: &str) -> Option<&Value> {
        self.keys.get(&KeyId::new(record_type, id))
    }

    pub fn key_count(&self, record_type: Option<RecordType>) -> usize {
        match record_type {
            Some(t) => self.keys.keys().filter(|k| k.record_type == t).count(),
            None => self.keys.len(),
        }
    }

    /// Applies one batch of updates: `Some` upserts, `None` deletes.
    pub fn apply<I>(&mut self, updates: I)
    where
        I: IntoIterator<Item = (KeyId, Option<Value>)>,
    {
        for (key, update) in updates {
            match update {
                Some(value) => {
                    self.keys.insert(key, value);
                }
                None => {
                    self.keys.remove(&key);
                }
            }
        }
    }

    pub fn encode(&self) -> Result<String> {
        self.encode_preserving(&BTreeMap::new())
    }

    pub fn decode(text: &str) -> Result<Self> {
        Ok(Self::decode_with_unknown(text)?.0)
    }

    /// Encodes this state together with groups of unknown record types that
    /// were read from storage earlier.
    pub fn encode_preserving(&self, unknown: &UnknownGroups) -> Result<String> {
        let mut keys: BTreeMap<String, BTreeMap<String, Value>> = unknown.clone();
        for (key, value) in &self.keys {
            keys.entry(key.record_type.as_str().to_string())
                .or_default()
                .insert(key.id.clone(), value.clone());
        }
        let blob = AuthStateBlob {
            creds: self.credentials.clone(),
            keys,
        };
        Ok(serde_json::to_string(&blob)?)
    }

    /// Decodes a stored blob, returning record groups whose type is not
    /// recognised separately.
    pub fn decode_with_unknown(text: &str) -> Result<(Self, UnknownGroups)> {
        let blob: AuthStateBlob = serde_json::from_str(text)?;
        let mut keys = BTreeMap::new();
        let mut unknown = UnknownGroups::new();

        for (type_name, group) in blob.keys {
            match type_name.parse::<RecordType>() {
                Ok(record_type) => {
                    for (id, value) in group {
                        keys.insert(KeyId::new(record_type, id), value);
                    }
                }
                Err(_) => {
                    warn!(
                        "Keeping {} stored records of unrecognised type '{}' as-is",
                        group.len(),
                        type_name
                    );
                    unknown.insert(type_name, group);
                }
            }
        }

        let credentials = if blob.creds.is_null() {
            Value::object()
        } else {
            blob.creds
        };

        Ok((Self { credentials, keys }, unknown))
    }
}

/// Stored record groups keyed by an unrecognised type name.
pub type UnknownGroups = BTreeMap<String, BTreeMap<String, Value>>;
