#![allow(dead_code)]

use async_trait::async_trait;
use authcore::Value;
use authcore::store::records::{KeyId, RecordType};
use authcore::types::session::SessionRecord;
use rand::RngCore;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use whatsapp_session::session::{
    LiveStatus, PairingRequest, PairingStart, PairingTransport, TransportError,
};
use whatsapp_session::store::{
    AuthBlobStore, InMemoryBackend, SessionKeyStore, SessionRowStore, StoreError,
};

#[derive(Debug, Clone)]
pub enum Pairing {
    Qr(String),
    Restore,
    Refuse,
}

/// Stands in for the protocol engine. Remembers the key store handed over
/// on pairing so tests can act as the engine rotating keys.
pub struct StubTransport {
    pairing: Mutex<Pairing>,
    refuse_remote: AtomicBool,
    calls: Mutex<Vec<String>>,
    keys: Mutex<Option<SessionKeyStore>>,
}

impl StubTransport {
    pub fn new(pairing: Pairing) -> Self {
        Self {
            pairing: Mutex::new(pairing),
            refuse_remote: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            keys: Mutex::new(None),
        }
    }

    pub fn set_pairing(&self, pairing: Pairing) {
        *self.pairing.lock().unwrap() = pairing;
    }

    /// Makes `disconnect` and `logout` fail with `ConnectionRefused`.
    pub fn refuse_remote(&self, refuse: bool) {
        self.refuse_remote.store(refuse, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn key_store(&self) -> Option<SessionKeyStore> {
        self.keys.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn remote_result(&self) -> Result<(), TransportError> {
        if self.refuse_remote.load(Ordering::SeqCst) {
            Err(TransportError::ConnectionRefused)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PairingTransport for StubTransport {
    async fn begin_pairing(&self, request: PairingRequest) -> Result<PairingStart, TransportError> {
        self.record(&format!("begin_pairing:{}", request.phone_number));
        let pairing = self.pairing.lock().unwrap().clone();
        match pairing {
            Pairing::Qr(code) => {
                *self.keys.lock().unwrap() = Some(request.keys);
                Ok(PairingStart::QrCode(code))
            }
            Pairing::Restore => {
                *self.keys.lock().unwrap() = Some(request.keys);
                Ok(PairingStart::Restored)
            }
            Pairing::Refuse => Err(TransportError::ConnectionRefused),
        }
    }

    async fn disconnect(&self, _session_id: &str) -> Result<(), TransportError> {
        self.record("disconnect");
        self.remote_result()
    }

    async fn logout(&self, _session_id: &str) -> Result<(), TransportError> {
        self.record("logout");
        self.remote_result()
    }

    async fn live_status(&self, _session_id: &str) -> Result<Option<LiveStatus>, TransportError> {
        Ok(None)
    }
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

pub fn pre_key_record() -> Value {
    Value::from([
        ("public", Value::Bytes(random_bytes(33))),
        ("private", Value::Bytes(random_bytes(32))),
    ])
}

/// A batch of records the engine would write right after pairing.
pub fn initial_keys(pre_keys: u32) -> Vec<(KeyId, Option<Value>)> {
    let mut updates: Vec<(KeyId, Option<Value>)> = (1..=pre_keys)
        .map(|id| (KeyId::new(RecordType::PreKey, id.to_string()), Some(pre_key_record())))
        .collect();
    updates.push((
        KeyId::new(RecordType::AppStateSyncKey, "AAAAAEFk"),
        Some(Value::from([
            ("keyData", Value::Bytes(random_bytes(32))),
            ("timestamp", Value::from(1_700_000_000i64)),
        ])),
    ));
    updates
}

pub fn credentials() -> Value {
    let key_pair = || {
        Value::from([
            ("public", Value::Bytes(random_bytes(32))),
            ("private", Value::Bytes(random_bytes(32))),
        ])
    };
    Value::from([
        ("noiseKey", key_pair()),
        ("signedIdentityKey", key_pair()),
        (
            "signedPreKey",
            Value::from([("keyId", Value::from(1u32)), ("keyPair", key_pair())]),
        ),
        ("registrationId", Value::from(4321u32)),
    ])
}

pub const OUTAGE: &str = "store down";

/// In-memory backend whose row or blob side can be switched off, failing
/// every call on that side with `StoreError::Unavailable(OUTAGE)`.
#[derive(Default)]
pub struct FlakyBackend {
    inner: InMemoryBackend,
    rows_down: AtomicBool,
    blobs_down: AtomicBool,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rows_down(&self, down: bool) {
        self.rows_down.store(down, Ordering::SeqCst);
    }

    pub fn set_blobs_down(&self, down: bool) {
        self.blobs_down.store(down, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(OUTAGE.to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionRowStore for FlakyBackend {
    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Self::check(&self.rows_down)?;
        self.inner.get_session(id).await
    }

    async fn get_session_by_owner(&self, owner_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Self::check(&self.rows_down)?;
        self.inner.get_session_by_owner(owner_id).await
    }

    async fn insert_session_if_absent(&self, record: SessionRecord) -> Result<SessionRecord, StoreError> {
        Self::check(&self.rows_down)?;
        self.inner.insert_session_if_absent(record).await
    }

    async fn update_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        Self::check(&self.rows_down)?;
        self.inner.update_session(record).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        Self::check(&self.rows_down)?;
        self.inner.list_sessions().await
    }
}

#[async_trait]
impl AuthBlobStore for FlakyBackend {
    async fn load_auth_state(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        Self::check(&self.blobs_down)?;
        self.inner.load_auth_state(session_id).await
    }

    async fn store_auth_state(&self, session_id: &str, encoded: &str) -> Result<(), StoreError> {
        Self::check(&self.blobs_down)?;
        self.inner.store_auth_state(session_id, encoded).await
    }

    async fn delete_auth_state(&self, session_id: &str) -> Result<(), StoreError> {
        Self::check(&self.blobs_down)?;
        self.inner.delete_auth_state(session_id).await
    }
}
