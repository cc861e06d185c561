//! File-backed policy store.
//!
//! The store owns the only mutable copy of the [`Policy`]. Readers get a
//! cheap `Arc` snapshot; writers go through [`ConfigStore::update`], which
//! serializes mutations and persists each one before publishing it.

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::Policy;

/// Errors raised while loading or persisting the policy file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Config file {} has an invalid schedule interval (must be > 0 seconds)", .path.display())]
    InvalidInterval { path: PathBuf },

    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to save config file {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize policy: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ConfigError {
    /// True for errors that mean the file on disk cannot be trusted.
    #[must_use]
    pub const fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. } | Self::InvalidInterval { .. })
    }
}

/// Serializes a policy the way it is stored on disk: 4-space indented
/// JSON with a trailing newline.
pub fn policy_json(policy: &Policy) -> Result<Vec<u8>, ConfigError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    policy.serialize(&mut serializer)?;
    buf.push(b'\n');
    Ok(buf)
}

/// Reads and validates a policy file.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn read_policy(path: &Path) -> Result<Option<Policy>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut policy: Policy =
        serde_json::from_str(&content).map_err(|source| ConfigError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;

    if policy.schedule_interval_secs == 0 {
        return Err(ConfigError::InvalidInterval {
            path: path.to_path_buf(),
        });
    }

    if policy.normalize() {
        warn!(
            "Normalized bad words / auto-reply trigger in {}; the cleaned form is written on the next change",
            path.display()
        );
    }

    Ok(Some(policy))
}

/// Durably replaces the policy file.
///
/// The new content goes to a sibling temporary file which is synced and
/// then renamed over the target, so readers never see a half-written file.
pub fn write_policy(path: &Path, policy: &Policy) -> Result<(), ConfigError> {
    let bytes = policy_json(policy)?;
    let tmp = tmp_path(path);

    write_then_rename(&tmp, path, &bytes).map_err(|source| {
        let _ = std::fs::remove_file(&tmp);
        ConfigError::Persistence {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(tmp, path)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Owner of the live policy.
pub struct ConfigStore {
    /// Where the policy is persisted.
    path: PathBuf,

    /// Latest published snapshot.
    current: RwLock<Arc<Policy>>,

    /// Held for the whole read-modify-persist-publish sequence.
    writer: Mutex<()>,
}

impl ConfigStore {
    /// Loads the policy from `path`, falling back to defaults when the
    /// file does not exist. Defaults are not written until the first change.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Corrupt`] or [`ConfigError::InvalidInterval`]
    /// if the file exists but cannot be used. The file is left untouched.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let policy = if let Some(policy) = read_policy(&path)? {
            info!("Loaded policy from {}", path.display());
            policy
        } else {
            warn!("Config file {} not found, loading defaults", path.display());
            Policy::default()
        };

        Ok(Self::with_policy(path, policy))
    }

    /// Creates a store around an already-built policy without touching disk.
    #[must_use]
    pub fn with_policy(path: impl Into<PathBuf>, policy: Policy) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(Arc::new(policy)),
            writer: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current snapshot.
    pub async fn get(&self) -> Arc<Policy> {
        Arc::clone(&*self.current.read().await)
    }

    /// Applies `mutate` to a copy of the current policy, persists the
    /// result and publishes it.
    ///
    /// Only one update runs at a time. If the mutation leaves the policy
    /// unchanged nothing is written. If saving fails the published snapshot
    /// stays as it was, so memory and disk never diverge.
    pub async fn update<R, F>(&self, mutate: F) -> Result<(Arc<Policy>, R), ConfigError>
    where
        F: FnOnce(&mut Policy) -> R,
    {
        let _writer = self.writer.lock().await;

        let current = self.get().await;
        let mut next = (*current).clone();
        let outcome = mutate(&mut next);

        if next == *current {
            debug!("Policy unchanged, skipping save");
            return Ok((current, outcome));
        }

        if next.schedule_interval_secs == 0 {
            return Err(ConfigError::InvalidInterval {
                path: self.path.clone(),
            });
        }

        write_policy(&self.path, &next)?;

        let next = Arc::new(next);
        *self.current.write().await = Arc::clone(&next);
        debug!("Policy saved to {}", self.path.display());

        Ok((next, outcome))
    }

    /// Writes the current snapshot to disk.
    pub async fn save(&self) -> Result<(), ConfigError> {
        let _writer = self.writer.lock().await;
        let current = self.get().await;
        write_policy(&self.path, &current)
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> ConfigStore {
        ConfigStore::load(dir.path().join("config.json")).unwrap()
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        assert_eq!(*store.get().await, Policy::default());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_load_corrupt_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = ConfigStore::load(&path).unwrap_err();
        assert!(err.is_corrupt());
        // The broken file must not be replaced.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_load_wrong_type_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"SCHEDULE_INTERVAL": "soon"}"#).unwrap();

        assert!(matches!(
            ConfigStore::load(&path),
            Err(ConfigError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_load_zero_interval_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"SCHEDULE_INTERVAL": 0}"#).unwrap();

        assert!(matches!(
            ConfigStore::load(&path),
            Err(ConfigError::InvalidInterval { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_persists_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let (policy, added) = store.update(|p| p.add_bad_word("spam")).await.unwrap();
        assert!(added);
        assert_eq!(policy.bad_words, vec!["spam".to_owned()]);

        let on_disk = read_policy(store.path()).unwrap().unwrap();
        assert_eq!(on_disk, *policy);
        assert_eq!(*store.get().await, *policy);
    }

    #[tokio::test]
    async fn test_unchanged_update_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let (_, added) = store.update(|p| p.remove_bad_word("spam")).await.unwrap();
        assert!(!added);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_save_load_round_trip_is_byte_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        write_policy(&path, &Policy::example()).unwrap();
        let original = std::fs::read(&path).unwrap();

        let store = ConfigStore::load(&path).unwrap();
        store.save().await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), original);
    }

    #[test]
    fn test_policy_json_uses_four_space_indent() {
        let json = String::from_utf8(policy_json(&Policy::default()).unwrap()).unwrap();
        assert!(json.starts_with("{\n    \"TOKEN\": \"\","));
        assert!(json.ends_with("}\n"));
    }

    #[tokio::test]
    async fn test_failed_save_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where a directory is expected makes every write fail.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = ConfigStore::with_policy(blocker.join("config.json"), Policy::default());

        let result = store.update(|p| p.add_bad_word("spam")).await;
        assert!(matches!(result, Err(ConfigError::Persistence { .. })));
        assert!(store.get().await.bad_words.is_empty());
    }

    #[tokio::test]
    async fn test_update_rejects_zero_interval() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let result = store.update(|p| p.schedule_interval_secs = 0).await;
        assert!(matches!(result, Err(ConfigError::InvalidInterval { .. })));
        assert_eq!(store.get().await.schedule_interval_secs, 3600);
    }

    #[tokio::test]
    async fn test_concurrent_updates_do_not_lose_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir));

        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store
                    .update(move |p| p.add_bad_word(&format!("word{i}")))
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.get().await.bad_words.len(), 16);
        let on_disk = read_policy(store.path()).unwrap().unwrap();
        assert_eq!(on_disk.bad_words.len(), 16);
    }
}
