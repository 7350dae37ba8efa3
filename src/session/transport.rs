use crate::store::key_store::SessionKeyStore;
use async_trait::async_trait;
use authcore::Value;
use authcore::types::session::ConnectionStatus;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection refused")]
    ConnectionRefused,
    #[error("timed out")]
    Timeout,
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// True when the remote side simply could not be reached.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, TransportError::ConnectionRefused | TransportError::Timeout)
    }
}

/// Everything the protocol engine needs to start (or resume) a session.
pub struct PairingRequest {
    pub session_id: String,
    pub phone_number: String,
    pub credentials: Value,
    /// Handle the engine uses to read and rotate key records during the session.
    pub keys: SessionKeyStore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingStart {
    /// The user has to scan this code.
    QrCode(String),
    /// Stored credentials were accepted; no pairing needed.
    Restored,
    /// The engine accepted the request and will report progress through events.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveStatus {
    pub connection_status: ConnectionStatus,
    pub qr_code: Option<String>,
}

/// The external protocol/transport engine, as seen by the session manager.
#[async_trait]
pub trait PairingTransport: Send + Sync {
    async fn begin_pairing(&self, request: PairingRequest) -> Result<PairingStart, TransportError>;

    async fn disconnect(&self, session_id: &str) -> Result<(), TransportError>;

    async fn logout(&self, session_id: &str) -> Result<(), TransportError>;

    /// Status as the engine currently sees it. `None` when the engine holds
    /// no live connection for the session.
    async fn live_status(&self, session_id: &str) -> Result<Option<LiveStatus>, TransportError>;
}

/// A transport with no remote side. Every call is refused, which makes it
/// suitable for local-only administration.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineTransport;

#[async_trait]
impl PairingTransport for OfflineTransport {
    async fn begin_pairing(&self, _request: PairingRequest) -> Result<PairingStart, TransportError> {
        Err(TransportError::ConnectionRefused)
    }

    async fn disconnect(&self, _session_id: &str) -> Result<(), TransportError> {
        Err(TransportError::ConnectionRefused)
    }

    async fn logout(&self, _session_id: &str) -> Result<(), TransportError> {
        Err(TransportError::ConnectionRefused)
    }

    async fn live_status(&self, _session_id: &str) -> Result<Option<LiveStatus>, TransportError> {
        Err(TransportError::ConnectionRefused)
    }
}
