use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Byte length of a pre-key public component (1-byte type tag + 32-byte key).
pub const PRE_KEY_PUBLIC_LEN: usize = 33;
/// Byte length of a pre-key private component.
pub const PRE_KEY_PRIVATE_LEN: usize = 32;

/// The kinds of key records the protocol engine stores through us.
///
/// Each kind has its own record shape. Only [`RecordType::PreKey`] has a
/// shape this crate checks beyond "binary fields are binary".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordType {
    PreKey,
    SignedPreKey,
    Session,
    SenderKey,
    SenderKeyMemory,
    AppStateSyncKey,
    AppStateSyncVersion,
    IdentityKey,
    LidMapping,
}

impl RecordType {
    pub const ALL: [RecordType; 9] = [
        RecordType::PreKey,
        RecordType::SignedPreKey,
        RecordType::Session,
        RecordType::SenderKey,
        RecordType::SenderKeyMemory,
        RecordType::AppStateSyncKey,
        RecordType::AppStateSyncVersion,
        RecordType::IdentityKey,
        RecordType::LidMapping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::PreKey => "pre-key",
            RecordType::SignedPreKey => "signed-pre-key",
            RecordType::Session => "session",
            RecordType::SenderKey => "sender-key",
            RecordType::SenderKeyMemory => "sender-key-memory",
            RecordType::AppStateSyncKey => "app-state-sync-key",
            RecordType::AppStateSyncVersion => "app-state-sync-version",
            RecordType::IdentityKey => "identity-key",
            RecordType::LidMapping => "lid-mapping",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRecordType(pub String);

impl fmt::Display for UnknownRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown record type: {}", self.0)
    }
}

impl std::error::Error for UnknownRecordType {}

impl FromStr for RecordType {
    type Err = UnknownRecordType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownRecordType(s.to_string()))
    }
}

/// Composite key of one stored record: `(record type, record id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId {
    pub record_type: RecordType,
    pub id: String,
}

impl KeyId {
    pub fn new(record_type: RecordType, id: impl Into<String>) -> Self {
        Self {
            record_type,
            id: id.into(),
        }
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.record_type, self.id)
    }
}

/// Field names of a pre-key record: `{ "public": <33 bytes>, "private": <32 bytes> }`.
pub const PRE_KEY_PUBLIC_FIELD: &str = "public";
pub const PRE_KEY_PRIVATE_FIELD: &str = "private";
