//! Persistence of deployment snapshots.
//!
//! A snapshot maps role names to the addresses a procedure produced, possibly nested for
//! composite results. It is written once at the end of a successful run and read back by
//! later runs that short-circuit instead of redeploying.

use std::{
    collections::{BTreeMap, HashMap},
    fs::OpenOptions,
    future::Future,
    io::Write,
    path::PathBuf,
    sync::Mutex,
};

use alloy_core::primitives::Address;
use anyhow::Context;
use fs2::FileExt;
use serde::{Deserialize, Serialize, Serializer, de::DeserializeOwned};

use crate::DeployError;

/// Named mapping of role names to addresses or nested snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, SnapshotValue>);

/// A value recorded under a role name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SnapshotValue {
    Address(Address),
    Nested(Snapshot),
}

impl Serialize for SnapshotValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // Addresses are always written in EIP-55 checksum casing.
            Self::Address(address) => serializer.serialize_str(&address.to_checksum(None)),
            Self::Nested(snapshot) => snapshot.serialize(serializer),
        }
    }
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, role: impl Into<String>, value: impl Into<SnapshotValue>) {
        self.0.insert(role.into(), value.into());
    }

    pub fn with(mut self, role: impl Into<String>, value: impl Into<SnapshotValue>) -> Self {
        self.insert(role, value);
        self
    }

    pub fn get(&self, role: &str) -> Option<&SnapshotValue> {
        self.0.get(role)
    }

    /// Address recorded directly under `role`.
    pub fn address(&self, role: &str) -> Option<Address> {
        match self.0.get(role) {
            Some(SnapshotValue::Address(address)) => Some(*address),
            _ => None,
        }
    }

    /// Nested snapshot recorded under `role`.
    pub fn nested(&self, role: &str) -> Option<&Snapshot> {
        match self.0.get(role) {
            Some(SnapshotValue::Nested(snapshot)) => Some(snapshot),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SnapshotValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flatten nested roles into dotted paths, e.g. `departmentFactory.departmentOwner`.
    pub fn flatten(&self) -> Vec<(String, Address)> {
        let mut entries = Vec::new();
        self.flatten_into("", &mut entries);
        entries
    }

    fn flatten_into(&self, prefix: &str, entries: &mut Vec<(String, Address)>) {
        for (role, value) in &self.0 {
            let path = if prefix.is_empty() {
                role.clone()
            } else {
                format!("{prefix}.{role}")
            };
            match value {
                SnapshotValue::Address(address) => entries.push((path, *address)),
                SnapshotValue::Nested(snapshot) => snapshot.flatten_into(&path, entries),
            }
        }
    }

    /// Build a snapshot from a typed procedure output.
    pub fn from_output<T: Serialize>(output: &T) -> serde_json::Result<Self> {
        serde_json::from_value(serde_json::to_value(output)?)
    }

    /// Read a typed procedure output back from the snapshot.
    pub fn into_output<T: DeserializeOwned>(self) -> serde_json::Result<T> {
        serde_json::from_value(serde_json::to_value(self)?)
    }
}

impl From<Address> for SnapshotValue {
    fn from(address: Address) -> Self {
        Self::Address(address)
    }
}

impl From<Snapshot> for SnapshotValue {
    fn from(snapshot: Snapshot) -> Self {
        Self::Nested(snapshot)
    }
}

/// Storage of named snapshots.
///
/// `save` must be atomic for readers: a later `load` sees either the full snapshot or
/// none. `load` of an unknown name fails with [`DeployError::NotFound`].
pub trait DeploymentRecorder {
    fn save(
        &self,
        name: &str,
        snapshot: &Snapshot,
    ) -> impl Future<Output = Result<(), DeployError>> + Send;

    fn load(&self, name: &str) -> impl Future<Output = Result<Snapshot, DeployError>> + Send;
}

/// Records snapshots as pretty-printed JSON files under a root directory.
#[derive(Debug, Clone)]
pub struct FsRecorder {
    root: PathBuf,
}

impl FsRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Path of the snapshot file for `name`.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn validate_name(name: &str) -> Result<(), DeployError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(DeployError::config(format!(
                "invalid snapshot name {name:?}"
            )));
        }
        Ok(())
    }

    fn write_snapshot(&self, name: &str, snapshot: &Snapshot) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.root).context(format!(
            "Failed to create deployments directory {}",
            self.root.display()
        ))?;

        // Advisory lock so that two runs never interleave writes to the same name.
        let lock_path = self.root.join(format!("{name}.lock"));
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .context(format!("Failed to open lock file {}", lock_path.display()))?;
        lock.try_lock_exclusive().context(format!(
            "Snapshot {name} is being written by another run"
        ))?;

        let json = serde_json::to_string_pretty(snapshot)
            .context("Failed to serialize deployment snapshot")?;

        let tmp_path = self.root.join(format!(".{name}.tmp"));
        let mut tmp = std::fs::File::create(&tmp_path)
            .context(format!("Failed to create {}", tmp_path.display()))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.sync_all())
            .context(format!("Failed to write {}", tmp_path.display()))?;

        let path = self.path(name);
        std::fs::rename(&tmp_path, &path).context(format!(
            "Failed to move snapshot into place at {}",
            path.display()
        ))?;

        FileExt::unlock(&lock).context("Failed to release snapshot lock")?;
        Ok(())
    }
}

impl DeploymentRecorder for FsRecorder {
    async fn save(&self, name: &str, snapshot: &Snapshot) -> Result<(), DeployError> {
        Self::validate_name(name)?;
        self.write_snapshot(name, snapshot)
            .map_err(|source| DeployError::Recorder {
                name: name.to_string(),
                source,
            })?;
        tracing::info!(path = %self.path(name).display(), "Deployment snapshot saved");
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Snapshot, DeployError> {
        Self::validate_name(name)?;
        let path = self.path(name);

        if !path.exists() {
            return Err(DeployError::NotFound {
                name: name.to_string(),
            });
        }

        let snapshot = std::fs::read_to_string(&path)
            .context(format!("Failed to read snapshot from {}", path.display()))
            .and_then(|content| {
                serde_json::from_str::<Snapshot>(&content)
                    .context("Failed to parse deployment snapshot JSON")
            })
            .map_err(|source| DeployError::Recorder {
                name: name.to_string(),
                source,
            })?;

        tracing::info!(path = %path.display(), "Deployment snapshot loaded");
        Ok(snapshot)
    }
}

/// Keeps snapshots in memory. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    snapshots: Mutex<HashMap<String, Snapshot>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a snapshot, as if a previous run had saved it.
    pub fn insert(&self, name: impl Into<String>, snapshot: Snapshot) {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.into(), snapshot);
    }

    pub fn get(&self, name: &str) -> Option<Snapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_empty()
    }
}

impl DeploymentRecorder for MemoryRecorder {
    async fn save(&self, name: &str, snapshot: &Snapshot) -> Result<(), DeployError> {
        self.insert(name, snapshot.clone());
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Snapshot, DeployError> {
        self.get(name).ok_or_else(|| DeployError::NotFound {
            name: name.to_string(),
        })
    }
}
