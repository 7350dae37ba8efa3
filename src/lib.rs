// Re-export core modules so callers only need this crate
pub use authcore::{Value, codec, phone};

pub mod types {
    pub use authcore::types::*;
}

pub mod config;
pub mod session;
pub mod store;

pub use config::SessionConfig;
pub use session::{ConnectOutcome, SessionError, SessionManager};
pub use store::{AuthStateStore, FileStore, InMemoryBackend, SessionKeyStore};
