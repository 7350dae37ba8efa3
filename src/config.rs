use std::path::PathBuf;
use std::time::Duration;

pub const DATA_DIR_ENV: &str = "WA_SESSION_DATA_DIR";
pub const PAIRING_TIMEOUT_ENV: &str = "WA_SESSION_PAIRING_TIMEOUT_SECS";
pub const REMOTE_TIMEOUT_ENV: &str = "WA_SESSION_REMOTE_TIMEOUT_SECS";

const DEFAULT_DATA_DIR: &str = "./session-data";
const DEFAULT_PAIRING_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Root directory of the file backend.
    pub data_dir: PathBuf,
    /// Upper bound on `begin_pairing` during `connect`.
    pub pairing_timeout: Duration,
    /// Upper bound on disconnect, logout and live status calls.
    pub remote_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            pairing_timeout: DEFAULT_PAIRING_TIMEOUT,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by `WA_SESSION_*` environment variables. Unset or
    /// unparsable values keep the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = lookup(DATA_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(timeout) = parse_secs(lookup(PAIRING_TIMEOUT_ENV)) {
            config.pairing_timeout = timeout;
        }
        if let Some(timeout) = parse_secs(lookup(REMOTE_TIMEOUT_ENV)) {
            config.remote_timeout = timeout;
        }
        config
    }
}

fn parse_secs(value: Option<String>) -> Option<Duration> {
    let secs: u64 = value?.trim().parse().ok()?;
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            (DATA_DIR_ENV, "/var/lib/wa"),
            (PAIRING_TIMEOUT_ENV, "15"),
            (REMOTE_TIMEOUT_ENV, "nope"),
        ]
        .into_iter()
        .collect();
        let config = SessionConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/wa"));
        assert_eq!(config.pairing_timeout, Duration::from_secs(15));
        assert_eq!(config.remote_timeout, DEFAULT_REMOTE_TIMEOUT);
    }

    #[test]
    fn zero_timeout_is_ignored() {
        let config = SessionConfig::from_lookup(|name| {
            (name == PAIRING_TIMEOUT_ENV).then(|| "0".to_string())
        });
        assert_eq!(config.pairing_timeout, DEFAULT_PAIRING_TIMEOUT);
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
    }
}
