use crate::value::Value;

/// Connection events reported by the transport for one session.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A (new) pairing QR code is available.
    Qr { code: String },
    /// Pairing finished; carries the phone number the remote side reports, if any.
    PairSuccess { phone_number: Option<String> },
    /// An already-paired session finished logging in.
    Connected,
    /// The connection dropped without being asked to.
    Disconnected { reason: Option<String> },
    /// The remote side removed this device.
    LoggedOut { reason: Option<String> },
    /// The protocol engine rotated or extended its credentials.
    CredentialsUpdated(Value),
}
