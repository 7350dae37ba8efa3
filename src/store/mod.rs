pub mod auth_store;
pub mod filestore;
pub mod key_store;
pub mod memory;

pub use auth_store::AuthStateStore;
pub use filestore::FileStore;
pub use key_store::{KeyTransaction, SessionKeyStore};
pub use memory::InMemoryBackend;

pub use authcore::store::error::{Result, StoreError};
pub use authcore::store::traits::{AuthBlobStore, Backend, KeyStore, SessionRowStore};
