//! Chain universe snapshots
//!
//! Snapshots are standalone JSON files holding a discovered chain universe.
//! They live in the data directory under `snapshots/`, each with a
//! `.json.sha256` sidecar for integrity checks.

use crate::core::error::{Result, SnapshotError};
use crate::core::model::{FirewallChain, check_limits};
use crate::utils::get_data_dir;
use crate::validators::validate_snapshot_name;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{info, warn};

/// A stored chain universe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Where the chains came from, e.g. `iptables:/tmp/rules.txt`
    #[serde(default)]
    pub source: String,
    pub chains: Vec<FirewallChain>,
}

impl Snapshot {
    pub fn new(source: impl Into<String>, chains: Vec<FirewallChain>) -> Self {
        Self {
            created_at: chrono::Utc::now(),
            source: source.into(),
            chains,
        }
    }
}

fn checksum(json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Directory of named snapshots
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Uses `dir` as the snapshot directory; it is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Uses `<data_dir>/snapshots`.
    pub fn default_location() -> Result<Self> {
        let mut dir = get_data_dir().ok_or(SnapshotError::DataDirUnavailable)?;
        dir.push("snapshots");
        Ok(Self::new(dir))
    }

    /// Returns the path to a snapshot file.
    /// Validates the name first to prevent directory traversal.
    fn path(&self, name: &str) -> Result<PathBuf> {
        validate_snapshot_name(name).map_err(SnapshotError::InvalidName)?;
        Ok(self.dir.join(format!("{name}.json")))
    }

    /// Lists all snapshot names, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        if !tokio::fs::try_exists(&self.dir).await? {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if path.is_file()
                && path.extension().and_then(|s| s.to_str()) == Some("json")
                && let Some(name) = path.file_stem().and_then(|s| s.to_str())
            {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Loads a snapshot by name.
    ///
    /// A checksum mismatch is logged but does not fail the load, since the
    /// file may have been edited by hand.
    pub async fn load(&self, name: &str) -> Result<Snapshot> {
        let path = self.path(name)?;

        if !tokio::fs::try_exists(&path).await? {
            return Err(SnapshotError::NotFound(name.to_string()).into());
        }

        let json = tokio::fs::read_to_string(&path).await?;

        let checksum_path = path.with_extension("json.sha256");
        if let Ok(expected) = tokio::fs::read_to_string(&checksum_path).await {
            let actual = checksum(&json);
            if expected.trim() != actual {
                warn!(
                    "Snapshot '{}' checksum mismatch (expected: {}, got: {})",
                    name,
                    expected.trim(),
                    actual
                );
            }
        }

        let snapshot: Snapshot = serde_json::from_str(&json)?;

        check_limits(&snapshot.chains)
            .map_err(|e| SnapshotError::TooLarge(format!("'{name}' contains {e}")))?;

        Ok(snapshot)
    }

    /// Saves a snapshot atomically.
    /// Uses a temporary file + rename so a crash mid-write never leaves a
    /// truncated snapshot behind.
    pub async fn save(&self, name: &str, snapshot: &Snapshot) -> Result<()> {
        let path = self.path(name)?;
        check_limits(&snapshot.chains)
            .map_err(|e| SnapshotError::TooLarge(format!("'{name}' contains {e}")))?;

        tokio::fs::create_dir_all(&self.dir).await?;

        let json = serde_json::to_string_pretty(snapshot)?;
        let temp_path = path.with_extension("json.tmp");

        #[cfg(unix)]
        {
            use tokio::fs::OpenOptions;
            use tokio::io::AsyncWriteExt;

            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .mode(0o600)
                .open(&temp_path)
                .await?;

            file.write_all(json.as_bytes()).await?;
            file.sync_all().await?;
        }

        #[cfg(not(unix))]
        {
            tokio::fs::write(&temp_path, &json).await?;
        }

        tokio::fs::rename(temp_path, &path).await?;
        tokio::fs::write(path.with_extension("json.sha256"), checksum(&json)).await?;

        info!("Saved snapshot '{}' ({} chains)", name, snapshot.chains.len());
        Ok(())
    }

    /// Deletes a snapshot and its checksum.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.path(name)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(SnapshotError::NotFound(name.to_string()).into());
        }
        tokio::fs::remove_file(&path).await?;

        let checksum_path = path.with_extension("json.sha256");
        if tokio::fs::try_exists(&checksum_path).await? {
            tokio::fs::remove_file(checksum_path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use crate::core::model::{FirewallRule, Policy};

    fn sample() -> Snapshot {
        Snapshot::new(
            "test",
            vec![FirewallChain::new("INPUT", Policy::Drop).with_rule(FirewallRule::any())],
        )
    }

    #[tokio::test]
    async fn test_save_load_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("snapshots"));

        assert!(store.list().await.unwrap().is_empty());

        let snapshot = sample();
        store.save("prod", &snapshot).await.unwrap();
        store.save("staging", &snapshot).await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["prod", "staging"]);
        assert_eq!(store.load("prod").await.unwrap(), snapshot);

        store.delete("prod").await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec!["staging"]);
        assert!(!dir.path().join("snapshots/prod.json.sha256").exists());
    }

    #[tokio::test]
    async fn test_rejects_traversal_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let err = store.save("../escape", &sample()).await.unwrap_err();
        assert!(matches!(err, Error::Snapshot(SnapshotError::InvalidName(_))));
    }

    #[tokio::test]
    async fn test_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(matches!(
            store.load("absent").await,
            Err(Error::Snapshot(SnapshotError::NotFound(_)))
        ));
        assert!(store.delete("absent").await.is_err());
    }

    #[tokio::test]
    async fn test_tampered_snapshot_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.save("edited", &sample()).await.unwrap();
        tokio::fs::write(dir.path().join("edited.json.sha256"), "0000")
            .await
            .unwrap();
        assert!(store.load("edited").await.is_ok());
    }
}
