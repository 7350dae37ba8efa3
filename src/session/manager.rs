use crate::config::SessionConfig;
use crate::session::call::{best_effort, must_succeed};
use crate::session::transport::{PairingRequest, PairingStart, PairingTransport, TransportError};
use crate::store::auth_store::AuthStateStore;
use authcore::phone::{PhoneNumberError, normalize_phone_number};
use authcore::store::error::StoreError;
use authcore::store::traits::Backend;
use authcore::types::events::ConnectionEvent;
use authcore::types::session::{ConnectionStatus, SessionRecord, SessionStatus, Transition};
use chrono::Utc;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(String),
    #[error("invalid phone number: {0}")]
    InvalidPhoneNumber(#[from] PhoneNumberError),
    #[error("remote unreachable: {0}")]
    RemoteUnreachable(TransportError),
    #[error("transport error: {0}")]
    Transport(TransportError),
    #[error("session is not connected")]
    NotConnected,
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// What `connect` achieved before returning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The user has to scan this code; status is `qr_pending`.
    QrPending(String),
    /// Pairing is in progress; completion arrives as an event.
    Connecting,
    /// Stored credentials were accepted.
    Connected,
    /// Nothing was done, the session was connected already.
    AlreadyConnected,
    /// Another operation moved the session on while pairing was starting.
    Superseded(ConnectionStatus),
}

impl ConnectOutcome {
    pub fn qr_code(&self) -> Option<&str> {
        match self {
            ConnectOutcome::QrPending(code) => Some(code),
            _ => None,
        }
    }
}

/// Drives the connection state machine of every session and keeps the
/// persisted row in step with it.
pub struct SessionManager {
    backend: Arc<dyn Backend>,
    store: Arc<AuthStateStore>,
    transport: Arc<dyn PairingTransport>,
    config: SessionConfig,
    row_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn Backend>,
        transport: Arc<dyn PairingTransport>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store: Arc::new(AuthStateStore::new(backend.clone())),
            backend,
            transport,
            config,
            row_locks: DashMap::new(),
        }
    }

    pub fn auth_store(&self) -> &Arc<AuthStateStore> {
        &self.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn session(&self, session_id: &str) -> Result<SessionRecord> {
        self.backend
            .get_session(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Returns the owner's session, creating a disconnected one on first use.
    pub async fn get_or_create(&self, owner_id: &str) -> Result<SessionRecord> {
        if let Some(existing) = self.backend.get_session_by_owner(owner_id).await? {
            return Ok(existing);
        }
        let id = hex::encode(rand::random::<[u8; 16]>());
        let record = self
            .backend
            .insert_session_if_absent(SessionRecord::new(id.clone(), owner_id))
            .await?;
        if record.id == id {
            info!(target: "Session", "Created session {} for owner {}", record.id, owner_id);
        }
        Ok(record)
    }

    pub async fn connect(&self, session_id: &str, phone_number: &str) -> Result<ConnectOutcome> {
        let phone_number = normalize_phone_number(phone_number)?;

        let mut already_connected = false;
        self.update(session_id, |record| {
            if record.connection_status == ConnectionStatus::Connected {
                already_connected = true;
                return false;
            }
            if !apply_transition(record, Transition::Connect) {
                return false;
            }
            record.phone_number = Some(phone_number.clone());
            record.last_error = None;
            record.qr_code = None;
            true
        })
        .await?;
        if already_connected {
            info!(target: "Session", "Session {} is already connected", session_id);
            return Ok(ConnectOutcome::AlreadyConnected);
        }
        info!(target: "Session", "Connecting session {} as {}", session_id, phone_number);

        let auth = self.store.load(session_id).await?;
        let request = PairingRequest {
            session_id: session_id.to_string(),
            phone_number,
            credentials: auth.credentials,
            keys: self.store.key_store(session_id),
        };

        let started = must_succeed(
            "begin_pairing",
            bounded(
                self.config.pairing_timeout,
                self.transport.begin_pairing(request),
            ),
        )
        .await;

        let start = match started {
            Ok(start) => start,
            Err(e) => {
                warn!(target: "Session", "Pairing for session {} failed: {}", session_id, e);
                let message = e.to_string();
                self.update(session_id, |record| {
                    // A reset or pairing event may have moved the session on meanwhile.
                    if record.connection_status != ConnectionStatus::Connecting {
                        return false;
                    }
                    record.last_error = Some(message);
                    true
                })
                .await?;
                return Err(remote_failure(e));
            }
        };

        let (transition, qr_code) = match start {
            PairingStart::QrCode(code) => (Transition::QrIssued, Some(code)),
            PairingStart::Restored => (Transition::Paired, None),
            PairingStart::Pending => return Ok(ConnectOutcome::Connecting),
        };
        let record = self
            .update(session_id, |record| {
                if !apply_transition(record, transition) {
                    return false;
                }
                record.qr_code = qr_code;
                record.last_error = None;
                true
            })
            .await?;

        Ok(match (record.connection_status, record.qr_code) {
            (ConnectionStatus::QrPending, Some(code)) => ConnectOutcome::QrPending(code),
            (ConnectionStatus::Connected, _) => ConnectOutcome::Connected,
            (ConnectionStatus::Connecting, _) => ConnectOutcome::Connecting,
            (status, _) => ConnectOutcome::Superseded(status),
        })
    }

    /// Live status when the transport answers, the persisted row otherwise.
    pub async fn get_status(&self, session_id: &str) -> Result<SessionStatus> {
        let record = self.session(session_id).await?;
        let live = best_effort(
            "live_status",
            bounded(
                self.config.remote_timeout,
                self.transport.live_status(session_id),
            ),
        )
        .await
        .flatten();

        let mut status = record.status();
        if let Some(live) = live {
            status.connection_status = live.connection_status;
            if live.qr_code.is_some() {
                status.qr_code = live.qr_code;
            }
        }
        Ok(status)
    }

    /// Returns the session if it can send right now.
    pub async fn ensure_connected(&self, session_id: &str) -> Result<SessionRecord> {
        let status = self.get_status(session_id).await?;
        if status.connection_status != ConnectionStatus::Connected || status.phone_number.is_none() {
            return Err(SessionError::NotConnected);
        }
        self.session(session_id).await
    }

    /// Resets the session to a clean, disconnected state. Remote cleanup is
    /// attempted but its failure never stops the local reset.
    pub async fn force_reset(&self, session_id: &str) -> Result<()> {
        self.session(session_id).await?;

        let limit = self.config.remote_timeout;
        best_effort("disconnect", bounded(limit, self.transport.disconnect(session_id))).await;
        best_effort("logout", bounded(limit, self.transport.logout(session_id))).await;

        self.store.clear(session_id).await?;
        self.update(session_id, |record| {
            apply_transition(record, Transition::Reset);
            record.phone_number = None;
            record.qr_code = None;
            record.last_error = None;
            record.last_disconnected_at = Some(Utc::now());
            true
        })
        .await?;
        info!(target: "Session", "Session {} reset", session_id);
        Ok(())
    }

    /// Asks the remote side to close the connection. Auth material is kept,
    /// so a later `connect` restores the session without pairing.
    pub async fn disconnect(&self, session_id: &str) -> Result<()> {
        self.session(session_id).await?;
        must_succeed(
            "disconnect",
            bounded(self.config.remote_timeout, self.transport.disconnect(session_id)),
        )
        .await
        .map_err(remote_failure)?;

        self.update(session_id, |record| {
            if !apply_transition(record, Transition::Disconnect) {
                return false;
            }
            record.qr_code = None;
            record.last_disconnected_at = Some(Utc::now());
            true
        })
        .await?;
        info!(target: "Session", "Session {} disconnected", session_id);
        Ok(())
    }

    /// Unlinks the device remotely, then drops all auth material. The phone
    /// number stays so the owner can pair again.
    pub async fn logout(&self, session_id: &str) -> Result<()> {
        self.session(session_id).await?;
        must_succeed(
            "logout",
            bounded(self.config.remote_timeout, self.transport.logout(session_id)),
        )
        .await
        .map_err(remote_failure)?;

        self.store.clear(session_id).await?;
        self.update(session_id, |record| {
            apply_transition(record, Transition::LoggedOut);
            record.qr_code = None;
            record.last_error = None;
            record.last_disconnected_at = Some(Utc::now());
            true
        })
        .await?;
        info!(target: "Session", "Session {} logged out", session_id);
        Ok(())
    }

    /// Applies an event reported by the transport and returns the resulting
    /// status.
    pub async fn handle_event(&self, session_id: &str, event: ConnectionEvent) -> Result<ConnectionStatus> {
        debug!(target: "Session", "Event for session {}: {:?}", session_id, event);
        let record = match event {
            ConnectionEvent::Qr { code } => {
                self.update(session_id, |record| {
                    if !apply_transition(record, Transition::QrIssued) {
                        return false;
                    }
                    record.qr_code = Some(code);
                    true
                })
                .await?
            }
            ConnectionEvent::PairSuccess { phone_number } => {
                let reported = phone_number.and_then(|raw| match normalize_phone_number(&raw) {
                    Ok(number) => Some(number),
                    Err(e) => {
                        warn!(target: "Session", "Ignoring reported phone number {:?}: {}", raw, e);
                        None
                    }
                });
                let record = self
                    .update(session_id, |record| {
                        if !apply_transition(record, Transition::Paired) {
                            return false;
                        }
                        if reported.is_some() {
                            record.phone_number = reported;
                        }
                        record.qr_code = None;
                        record.last_error = None;
                        true
                    })
                    .await?;
                info!(target: "Session", "Pairing succeeded for session {}", session_id);
                record
            }
            ConnectionEvent::Connected => {
                self.update(session_id, |record| {
                    if !apply_transition(record, Transition::Paired) {
                        return false;
                    }
                    record.qr_code = None;
                    record.last_error = None;
                    true
                })
                .await?
            }
            ConnectionEvent::Disconnected { reason } => {
                self.update(session_id, |record| {
                    if !apply_transition(record, Transition::Dropped) {
                        return false;
                    }
                    record.qr_code = None;
                    record.last_error = reason;
                    record.last_disconnected_at = Some(Utc::now());
                    true
                })
                .await?
            }
            ConnectionEvent::LoggedOut { reason } => {
                self.session(session_id).await?;
                self.store.clear(session_id).await?;
                let record = self
                    .update(session_id, |record| {
                        apply_transition(record, Transition::LoggedOut);
                        record.qr_code = None;
                        record.last_error = reason;
                        record.last_disconnected_at = Some(Utc::now());
                        true
                    })
                    .await?;
                info!(target: "Session", "Session {} was logged out remotely", session_id);
                record
            }
            ConnectionEvent::CredentialsUpdated(credentials) => {
                let record = self.session(session_id).await?;
                self.store.save_credentials(session_id, credentials).await?;
                record
            }
        };
        Ok(record.connection_status)
    }

    /// Read-modify-write of one session row. `apply` returns whether the
    /// row changed; unchanged rows are not written back.
    async fn update<F>(&self, session_id: &str, apply: F) -> Result<SessionRecord>
    where
        F: FnOnce(&mut SessionRecord) -> bool,
    {
        let lock = self
            .row_locks
            .entry(session_id.to_string())
            .or_default()
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.apply_to_row(session_id, apply).await
        };
        drop(lock);
        // Only the map still references the lock: nobody holds or waits on it.
        self.row_locks
            .remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn apply_to_row<F>(&self, session_id: &str, apply: F) -> Result<SessionRecord>
    where
        F: FnOnce(&mut SessionRecord) -> bool,
    {
        let mut record = self.session(session_id).await?;
        if apply(&mut record) {
            record.updated_at = Utc::now();
            self.backend.update_session(&record).await?;
        }
        Ok(record)
    }
}

fn apply_transition(record: &mut SessionRecord, transition: Transition) -> bool {
    match record.connection_status.next(transition) {
        Some(next) => {
            if next != record.connection_status {
                debug!(
                    target: "Session",
                    "Session {}: {} -> {}",
                    record.id, record.connection_status, next
                );
            }
            record.connection_status = next;
            true
        }
        None => {
            warn!(
                target: "Session",
                "Ignoring {:?} for session {} in state {}",
                transition, record.id, record.connection_status
            );
            false
        }
    }
}

/// Unreachable remotes are retryable; anything else the remote said is not.
fn remote_failure(e: TransportError) -> SessionError {
    if e.is_connectivity() {
        SessionError::RemoteUnreachable(e)
    } else {
        SessionError::Transport(e)
    }
}

async fn bounded<T, F>(limit: Duration, call: F) -> std::result::Result<T, TransportError>
where
    F: Future<Output = std::result::Result<T, TransportError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(TransportError::Timeout))
}
