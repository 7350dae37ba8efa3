use crate::store::error::Result;
use crate::store::records::{KeyId, RecordType};
use crate::types::session::SessionRecord;
use crate::value::Value;
use async_trait::async_trait;
use std::collections::HashMap;

/// The per-session row: identity, phone number and connection status columns.
#[async_trait]
pub trait SessionRowStore: Send + Sync {
    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>>;

    async fn get_session_by_owner(&self, owner_id: &str) -> Result<Option<SessionRecord>>;

    /// Inserts `record` unless the owner already has a session. Returns the
    /// stored row in both cases; concurrent callers for one owner all get
    /// the same row.
    async fn insert_session_if_absent(&self, record: SessionRecord) -> Result<SessionRecord>;

    /// Replaces the status columns of an existing row. Never touches the
    /// auth blob.
    async fn update_session(&self, record: &SessionRecord) -> Result<()>;

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>>;
}

/// The per-session `auth_state` column, stored as encoded text.
#[async_trait]
pub trait AuthBlobStore: Send + Sync {
    async fn load_auth_state(&self, session_id: &str) -> Result<Option<String>>;

    /// Replaces the blob in one write: readers see either the old or the new text.
    async fn store_auth_state(&self, session_id: &str, encoded: &str) -> Result<()>;

    async fn delete_auth_state(&self, session_id: &str) -> Result<()>;
}

pub trait Backend: SessionRowStore + AuthBlobStore + Send + Sync {}

impl<T> Backend for T where T: SessionRowStore + AuthBlobStore + Send + Sync {}

/// Key access handed to the protocol engine, already bound to one session.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Ids without a stored record are absent from the result.
    async fn get(&self, record_type: RecordType, ids: &[String]) -> Result<HashMap<String, Value>>;

    /// Applies all updates atomically; `None` deletes.
    async fn set(&self, updates: Vec<(KeyId, Option<Value>)>) -> Result<()>;
}
