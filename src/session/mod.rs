pub mod call;
pub mod manager;
pub mod transport;

pub use manager::{ConnectOutcome, SessionError, SessionManager};
pub use transport::{
    LiveStatus, OfflineTransport, PairingRequest, PairingStart, PairingTransport, TransportError,
};
