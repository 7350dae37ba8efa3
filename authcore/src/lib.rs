pub mod codec;
pub mod phone;
pub mod store;
pub mod types;
pub mod value;

pub use value::Value;
