//! Durable record of the last published document.
//!
//! The state file is a small JSON object:
//!
//! ```json
//! { "last": "https://example.org/pliki/zast.pdf", "hash": "9f86d0…", "timestamp": "2024-03-15T07:30:00Z" }
//! ```
//!
//! [`StateStore`] owns the single in-memory copy behind an async mutex. The
//! pipeline holds that lock for a whole cycle and the control panel's reset
//! takes the same lock, so the two writers never interleave. Status readers
//! use [`StateStore::snapshot`], which never waits on the lock.

use crate::error::WatchError;
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// What has already been published.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchState {
    /// Link the last published document was found under.
    #[serde(rename = "last", default)]
    pub last_link: String,

    /// SHA-256 of the last published document; empty before the first
    /// publication and after a reset.
    #[serde(rename = "hash", default)]
    pub last_fingerprint: String,

    #[serde(
        rename = "timestamp",
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl WatchState {
    /// State recording a fresh publication.
    pub fn published(link: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            last_link: link.into(),
            last_fingerprint: fingerprint.into(),
            last_updated_at: Some(Utc::now()),
        }
    }

    /// Empty state stamped with the reset time.
    pub fn cleared() -> Self {
        Self {
            last_updated_at: Some(Utc::now()),
            ..Self::default()
        }
    }
}

/// Accepts RFC 3339 timestamps and the offset-less ISO form older state files
/// carry (interpreted as local time). Anything else becomes `None` rather than
/// invalidating the whole file.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| parse_timestamp(&s)))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| naive.and_local_timezone(Local).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Read the state file. A missing, unreadable or malformed file yields the
/// empty state.
pub async fn load_state(path: &Path) -> WatchState {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No state file at {}, starting fresh", path.display());
            return WatchState::default();
        }
        Err(e) => {
            warn!("Cannot read state file {}: {}; starting fresh", path.display(), e);
            return WatchState::default();
        }
    };

    match serde_json::from_slice::<WatchState>(&bytes) {
        Ok(state) => {
            debug!(link = %state.last_link, "Loaded watch state");
            state
        }
        Err(e) => {
            warn!("State file {} is malformed ({}); starting fresh", path.display(), e);
            WatchState::default()
        }
    }
}

/// Write the state file atomically (temp file + rename).
pub async fn save_state(path: &Path, state: &WatchState) -> Result<(), WatchError> {
    let fail = |source: std::io::Error| WatchError::PersistenceFailed {
        path: path.to_path_buf(),
        source,
    };

    let bytes = serde_json::to_vec_pretty(state)
        .map_err(|e| WatchError::Internal(format!("state serialisation: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }

    let tmp = path.with_extension("json.tmp");
    let mut file = tokio::fs::File::create(&tmp).await.map_err(fail)?;
    file.write_all(&bytes).await.map_err(fail)?;
    file.flush().await.map_err(fail)?;
    drop(file);

    tokio::fs::rename(&tmp, path).await.map_err(fail)
}

/// Single-writer owner of [`WatchState`].
pub struct StateStore {
    path: PathBuf,
    state: Mutex<WatchState>,
    snapshot: watch::Sender<WatchState>,
}

impl StateStore {
    /// Load the state file (never fails, see [`load_state`]).
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = load_state(&path).await;
        Self::with_state(path, state)
    }

    /// Build a store around an already-known state without touching disk.
    pub fn with_state(path: impl Into<PathBuf>, state: WatchState) -> Self {
        let (snapshot, _) = watch::channel(state.clone());
        Self {
            path: path.into(),
            state: Mutex::new(state),
            snapshot,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current state; never blocks on an in-flight cycle.
    pub fn snapshot(&self) -> WatchState {
        self.snapshot.borrow().clone()
    }

    /// Take the writer lock. Held by the pipeline for a whole cycle.
    pub async fn lock(&self) -> StateGuard<'_> {
        StateGuard {
            guard: self.state.lock().await,
            store: self,
        }
    }

    /// Forget the last publication so the next cycle treats the remote
    /// document as new. Waits for any in-flight cycle to finish.
    pub async fn reset(&self) -> Result<(), WatchError> {
        let mut guard = self.lock().await;
        guard.replace(WatchState::cleared()).await?;
        info!("Watch state reset");
        Ok(())
    }
}

/// Exclusive access to the state for the duration of one cycle.
pub struct StateGuard<'a> {
    guard: MutexGuard<'a, WatchState>,
    store: &'a StateStore,
}

impl StateGuard<'_> {
    pub fn current(&self) -> &WatchState {
        &self.guard
    }

    /// Record a publication. The in-memory state is updated even if the
    /// write fails, so this process will not publish the same content twice.
    pub async fn record(&mut self, link: &str, fingerprint: &str) -> Result<(), WatchError> {
        self.replace(WatchState::published(link, fingerprint)).await
    }

    async fn replace(&mut self, state: WatchState) -> Result<(), WatchError> {
        *self.guard = state.clone();
        self.store.snapshot.send_replace(state.clone());
        save_state(&self.store.path, &state).await
    }
}
