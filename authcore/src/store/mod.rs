pub mod auth_state;
pub mod error;
pub mod records;
pub mod traits;
pub mod validate;

pub use auth_state::AuthState;
pub use records::{KeyId, RecordType};
pub use validate::{Corruption, MalformedKeyRecord, Validated};
