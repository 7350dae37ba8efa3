//! Post-decode checks and best-effort repair for stored key records.
//!
//! Nothing here fails: a malformed record is reported (and logged) and
//! handed back as-is, because the protocol engine routinely holds stale or
//! partial keys and a single bad record must never block loading a session.

use crate::codec;
use crate::store::records::{
    KeyId, PRE_KEY_PRIVATE_FIELD, PRE_KEY_PRIVATE_LEN, PRE_KEY_PUBLIC_FIELD, PRE_KEY_PUBLIC_LEN, RecordType,
};
use crate::value::Value;
use log::{debug, warn};
use std::fmt;

/// What is wrong with a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Corruption {
    /// A binary field has the wrong length.
    WrongLength {
        field: String,
        observed: usize,
        expected: usize,
    },
    /// A field that must hold binary data holds something else (or is missing).
    NotBytes { field: String },
    /// A marker object whose payload could not be decoded.
    UndecodableMarker { path: String },
}

impl fmt::Display for Corruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Corruption::WrongLength {
                field,
                observed,
                expected,
            } => write!(f, "field '{field}' is {observed} bytes, expected {expected}"),
            Corruption::NotBytes { field } => write!(f, "field '{field}' is not binary data"),
            Corruption::UndecodableMarker { path } => {
                write!(f, "marker at '{path}' has an undecodable payload")
            }
        }
    }
}

/// A non-fatal report about one stored record. `record_type` is `None` for
/// the session's credentials blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedKeyRecord {
    pub session_id: String,
    pub record_type: Option<RecordType>,
    pub record_id: String,
    pub corruption: Corruption,
}

impl fmt::Display for MalformedKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record_type = self.record_type.map_or("creds", |t| t.as_str());
        write!(
            f,
            "malformed key record (session={}, type={}, id={}): {}",
            self.session_id, record_type, self.record_id, self.corruption
        )
    }
}

/// A record after validation, with whatever problems were found.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    pub value: Value,
    /// Number of marker objects converted to bytes in place.
    pub repaired: usize,
    pub problems: Vec<MalformedKeyRecord>,
}

impl Validated {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Credential fields holding `{public, private}` key pairs.
const CREDENTIAL_KEY_PAIRS: [&[&str]; 4] = [
    &["noiseKey"],
    &["pairingEphemeralKeyPair"],
    &["signedIdentityKey"],
    &["signedPreKey", "keyPair"],
];

pub fn validate_record(session_id: &str, key: &KeyId, mut value: Value) -> Validated {
    let repaired = value.restore_bytes();
    let mut problems = Vec::new();
    let report = |corruption| MalformedKeyRecord {
        session_id: session_id.to_string(),
        record_type: Some(key.record_type),
        record_id: key.id.clone(),
        corruption,
    };

    for path in undecodable_markers(&value) {
        problems.push(report(Corruption::UndecodableMarker { path }));
    }

    if key.record_type == RecordType::PreKey {
        for (field, expected) in [
            (PRE_KEY_PUBLIC_FIELD, PRE_KEY_PUBLIC_LEN),
            (PRE_KEY_PRIVATE_FIELD, PRE_KEY_PRIVATE_LEN),
        ] {
            if let Some(corruption) = check_bytes_field(&value, field, expected) {
                problems.push(report(corruption));
            }
        }
    }

    if repaired > 0 {
        debug!(
            "Restored {} nested buffer marker(s) in {} record {} of session {}",
            repaired, key.record_type, key.id, session_id
        );
    }
    log_problems(&problems);

    Validated {
        value,
        repaired,
        problems,
    }
}

pub fn validate_credentials(session_id: &str, mut credentials: Value) -> Validated {
    let repaired = credentials.restore_bytes();
    let mut problems = Vec::new();
    let report = |corruption| MalformedKeyRecord {
        session_id: session_id.to_string(),
        record_type: None,
        record_id: "creds".to_string(),
        corruption,
    };

    for path in undecodable_markers(&credentials) {
        problems.push(report(Corruption::UndecodableMarker { path }));
    }

    for path in CREDENTIAL_KEY_PAIRS {
        let Some(pair) = path.iter().try_fold(&credentials, |v, field| v.get(field)) else {
            continue;
        };
        for field in [PRE_KEY_PUBLIC_FIELD, PRE_KEY_PRIVATE_FIELD] {
            if pair.get(field).and_then(Value::as_bytes).is_none() {
                problems.push(report(Corruption::NotBytes {
                    field: format!("{}.{}", path.join("."), field),
                }));
            }
        }
    }

    log_problems(&problems);

    Validated {
        value: credentials,
        repaired,
        problems,
    }
}

fn check_bytes_field(value: &Value, field: &str, expected: usize) -> Option<Corruption> {
    match value.get(field) {
        Some(Value::Bytes(bytes)) if bytes.len() == expected => None,
        Some(Value::Bytes(bytes)) => Some(Corruption::WrongLength {
            field: field.to_string(),
            observed: bytes.len(),
            expected,
        }),
        _ => Some(Corruption::NotBytes {
            field: field.to_string(),
        }),
    }
}

fn undecodable_markers(value: &Value) -> Vec<String> {
    fn walk(value: &Value, path: &mut Vec<String>, out: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                if codec::looks_like_marker(map) {
                    out.push(if path.is_empty() {
                        "$".to_string()
                    } else {
                        path.join(".")
                    });
                    return;
                }
                for (k, v) in map {
                    path.push(k.clone());
                    walk(v, path, out);
                    path.pop();
                }
            }
            Value::Array(items) => {
                for (i, v) in items.iter().enumerate() {
                    path.push(i.to_string());
                    walk(v, path, out);
                    path.pop();
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    walk(value, &mut Vec::new(), &mut out);
    out
}

fn log_problems(problems: &[MalformedKeyRecord]) {
    for problem in problems {
        match &problem.corruption {
            Corruption::WrongLength {
                field,
                observed,
                expected,
            } => warn!(
                target: "AuthStore",
                "Corrupted key record: session={} type={} id={} field={} length={} expected={}",
                problem.session_id,
                problem.record_type.map_or("creds", |t| t.as_str()),
                problem.record_id,
                field,
                observed,
                expected
            ),
            _ => warn!(target: "AuthStore", "{problem}"),
        }
    }
}
