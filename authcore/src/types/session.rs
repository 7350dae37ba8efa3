use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    QrPending,
    Connected,
    LoggedOut,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::QrPending => "qr_pending",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::LoggedOut => "logged_out",
        }
    }

    /// The state reached by applying `transition`, or `None` when the
    /// transition is not allowed from this state.
    pub fn next(self, transition: Transition) -> Option<ConnectionStatus> {
        use ConnectionStatus::*;
        match (transition, self) {
            (Transition::Reset, _) => Some(Disconnected),
            (Transition::Connect, Connected) => None,
            (Transition::Connect, _) => Some(Connecting),
            (Transition::QrIssued, Connecting | QrPending) => Some(QrPending),
            (Transition::QrIssued, _) => None,
            (Transition::Paired, Connecting | QrPending | Connected) => Some(Connected),
            (Transition::Paired, _) => None,
            (Transition::Dropped | Transition::Disconnect, LoggedOut) => None,
            (Transition::Dropped | Transition::Disconnect, _) => Some(Disconnected),
            (Transition::LoggedOut, _) => Some(LoggedOut),
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs of the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Caller asked to connect.
    Connect,
    /// Transport produced a pairing QR code.
    QrIssued,
    /// Transport reports pairing/login succeeded.
    Paired,
    /// Transport dropped the connection on its own.
    Dropped,
    /// Caller asked to disconnect.
    Disconnect,
    /// Remote or caller logged the device out.
    LoggedOut,
    /// Unconditional local reset.
    Reset,
}

/// Persisted session row, minus the auth blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub owner_id: String,
    pub phone_number: Option<String>,
    pub connection_status: ConnectionStatus,
    pub last_error: Option<String>,
    pub last_disconnected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub qr_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            phone_number: None,
            connection_status: ConnectionStatus::Disconnected,
            last_error: None,
            last_disconnected_at: None,
            qr_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            connection_status: self.connection_status,
            phone_number: self.phone_number.clone(),
            qr_code: self.qr_code.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

/// What callers see when they ask how a session is doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub connection_status: ConnectionStatus,
    pub phone_number: Option<String>,
    pub qr_code: Option<String>,
    pub last_error: Option<String>,
}
