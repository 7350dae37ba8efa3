use async_trait::async_trait;
use authcore::store::error::{Result, StoreError};
use authcore::store::traits::{AuthBlobStore, SessionRowStore};
use authcore::types::session::SessionRecord;
use log::{debug, warn};
use serde::{Serialize, de::DeserializeOwned};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

const SESSIONS_DIR: &str = "sessions";
const SESSION_FILE: &str = "session.json";
const AUTH_STATE_FILE: &str = "auth_state.json";

/// Durable backend keeping one directory per session:
///
/// ```text
/// <root>/sessions/<id>/session.json     status row
/// <root>/sessions/<id>/auth_state.json  encoded auth blob
/// ```
///
/// Every write goes to a temporary file that is fsynced and then renamed
/// over the target, so a crash leaves either the previous or the new
/// content on disk.
pub struct FileStore {
    base_path: PathBuf,
    create_lock: Mutex<()>,
}

impl FileStore {
    pub async fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let store = Self {
            base_path: path.into(),
            create_lock: Mutex::new(()),
        };
        fs::create_dir_all(store.sessions_dir()).await?;
        Ok(store)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn sessions_dir(&self) -> PathBuf {
        self.base_path.join(SESSIONS_DIR)
    }

    fn session_dir(&self, id: &str) -> PathBuf {
        self.sessions_dir().join(Self::sanitize_filename(id))
    }

    fn sanitize_filename(key: &str) -> String {
        let name = key.replace(|c: char| !c.is_alphanumeric() && c != '.' && c != '-', "_");
        if name.chars().all(|c| c == '.') {
            // "", "." and ".." would escape or alias the sessions directory
            return format!("_{}", name.replace('.', "_"));
        }
        name
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match fs::read(path).await {
            Ok(data) => serde_json::from_slice(&data)
                .map(Some)
                .map_err(|e| StoreError::Serialization(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_failure(e, path)),
        }
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let data = serde_json::to_vec_pretty(value)?;
        write_atomic(path, data).await
    }

    async fn scan_sessions(&self) -> Result<Vec<SessionRecord>> {
        let dir = self.sessions_dir();
        let mut result = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::Unavailable(format!(
                    "store directory {} is missing",
                    dir.display()
                )));
            }
            Err(e) => return Err(io_failure(e, &dir)),
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_failure(e, &dir))? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let path = entry.path().join(SESSION_FILE);
            match self.read_json::<SessionRecord>(&path).await {
                Ok(Some(record)) => result.push(record),
                Ok(None) => {}
                Err(StoreError::Serialization(reason)) => {
                    warn!("Skipping unreadable session row: {}", reason);
                }
                Err(e) => return Err(e),
            }
        }
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(result)
    }
}

/// Io failures that mean the store itself cannot be reached become
/// `Unavailable`; everything else stays `Io`.
fn io_failure(e: io::Error, path: &Path) -> StoreError {
    use io::ErrorKind::*;
    match e.kind() {
        PermissionDenied | ReadOnlyFilesystem | StaleNetworkFileHandle | TimedOut | NotConnected
        | ConnectionRefused | ConnectionReset | BrokenPipe => {
            StoreError::Unavailable(format!("{}: {e}", path.display()))
        }
        _ => StoreError::Io(e),
    }
}

async fn write_atomic(target: &Path, data: Vec<u8>) -> Result<()> {
    let path = target.to_path_buf();
    tokio::task::spawn_blocking(move || -> io::Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| io::Error::other("target path has no parent directory"))?;
        std::fs::create_dir_all(dir)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = dir.join(format!(
            ".{file_name}.{}.tmp",
            hex::encode(rand::random::<[u8; 6]>())
        ));

        let write_result = (|| {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
            std::fs::rename(&tmp_path, &path)
        })();
        if write_result.is_err() {
            let _ = std::fs::remove_file(&tmp_path);
        }
        write_result
    })
    .await
    .map_err(|e| StoreError::Backend(Box::new(e)))?
    .map_err(|e| io_failure(e, target))
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_failure(e, path)),
    }
}

#[async_trait]
impl SessionRowStore for FileStore {
    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>> {
        self.read_json(&self.session_dir(id).join(SESSION_FILE)).await
    }

    async fn get_session_by_owner(&self, owner_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self
            .scan_sessions()
            .await?
            .into_iter()
            .find(|s| s.owner_id == owner_id))
    }

    async fn insert_session_if_absent(&self, record: SessionRecord) -> Result<SessionRecord> {
        let _guard = self.create_lock.lock().await;
        if let Some(existing) = self.get_session_by_owner(&record.owner_id).await? {
            return Ok(existing);
        }
        let path = self.session_dir(&record.id).join(SESSION_FILE);
        debug!("Creating session row at {}", path.display());
        self.write_json(&path, &record).await?;
        Ok(record)
    }

    async fn update_session(&self, record: &SessionRecord) -> Result<()> {
        let path = self.session_dir(&record.id).join(SESSION_FILE);
        if !fs::try_exists(&path).await.map_err(|e| io_failure(e, &path))? {
            return Err(StoreError::NotFound(format!("session {}", record.id)));
        }
        self.write_json(&path, record).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        self.scan_sessions().await
    }
}

#[async_trait]
impl AuthBlobStore for FileStore {
    async fn load_auth_state(&self, session_id: &str) -> Result<Option<String>> {
        let path = self.session_dir(session_id).join(AUTH_STATE_FILE);
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_failure(e, &path)),
        }
    }

    async fn store_auth_state(&self, session_id: &str, encoded: &str) -> Result<()> {
        let path = self.session_dir(session_id).join(AUTH_STATE_FILE);
        write_atomic(&path, encoded.as_bytes().to_vec()).await
    }

    async fn delete_auth_state(&self, session_id: &str) -> Result<()> {
        remove_if_exists(&self.session_dir(session_id).join(AUTH_STATE_FILE)).await
    }
}
