//! Compiled contract artifacts (ABI + creation bytecode) addressed by contract name.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use alloy_core::{json_abi::JsonAbi, primitives::Bytes};
use anyhow::Context;
use serde::Deserialize;

use crate::DeployError;

/// A compiled contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub abi: JsonAbi,
    /// Creation bytecode. `None` for interfaces and ABI-only artifacts.
    pub bytecode: Option<Bytes>,
}

/// On-disk artifact layouts we understand: forge output or a bare ABI array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ArtifactFile {
    Compiled {
        abi: JsonAbi,
        #[serde(default)]
        bytecode: Option<BytecodeField>,
    },
    Abi(JsonAbi),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BytecodeField {
    Object { object: Bytes },
    Hex(Bytes),
}

impl From<ArtifactFile> for Artifact {
    fn from(file: ArtifactFile) -> Self {
        match file {
            ArtifactFile::Compiled { abi, bytecode } => {
                let bytecode = bytecode
                    .map(|field| match field {
                        BytecodeField::Object { object } => object,
                        BytecodeField::Hex(bytes) => bytes,
                    })
                    .filter(|bytes| !bytes.is_empty());
                Self { abi, bytecode }
            }
            ArtifactFile::Abi(abi) => Self {
                abi,
                bytecode: None,
            },
        }
    }
}

/// Registry of artifacts shared by the executor (encoding) and the deployer (event decoding).
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    artifacts: HashMap<String, Artifact>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an artifact under `name`, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, artifact: Artifact) {
        self.artifacts.insert(name.into(), artifact);
    }

    /// Register an ABI-only artifact.
    pub fn with_abi(mut self, name: impl Into<String>, abi: JsonAbi) -> Self {
        self.insert(
            name,
            Artifact {
                abi,
                bytecode: None,
            },
        );
        self
    }

    /// Parse a single artifact from its JSON text.
    pub fn parse_artifact(json: &str) -> anyhow::Result<Artifact> {
        let file: ArtifactFile =
            serde_json::from_str(json).context("Failed to parse contract artifact")?;
        Ok(file.into())
    }

    /// Load every artifact found under `dir`, recursively.
    ///
    /// The file stem is the contract name (`out/Counter.sol/Counter.json` registers `Counter`).
    /// Files that are not artifacts, such as forge build-info files, are skipped.
    pub fn load_dir(dir: &Path) -> anyhow::Result<Self> {
        let mut files = Vec::new();
        collect_json_files(dir, &mut files)
            .context(format!("Failed to scan artifacts directory {}", dir.display()))?;
        files.sort();

        let mut store = Self::new();
        for path in files {
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            let content = std::fs::read_to_string(&path)
                .context(format!("Failed to read artifact {}", path.display()))?;

            let artifact = match Self::parse_artifact(&content) {
                Ok(artifact) => artifact,
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "Skipping non-artifact file");
                    continue;
                }
            };

            if store.artifacts.contains_key(name) {
                tracing::warn!(
                    name,
                    path = %path.display(),
                    "Duplicate artifact name, keeping the first one"
                );
                continue;
            }

            store.insert(name, artifact);
        }

        tracing::info!(
            path = %dir.display(),
            artifacts = store.artifacts.len(),
            "Artifacts loaded"
        );
        Ok(store)
    }

    pub fn get(&self, name: &str) -> Result<&Artifact, DeployError> {
        self.artifacts
            .get(name)
            .ok_or_else(|| DeployError::config(format!("no artifact named {name}")))
    }

    pub fn abi(&self, name: &str) -> Result<&JsonAbi, DeployError> {
        self.get(name).map(|artifact| &artifact.abi)
    }

    /// Creation bytecode of `name`, failing for ABI-only artifacts.
    pub fn bytecode(&self, name: &str) -> Result<&Bytes, DeployError> {
        self.get(name)?
            .bytecode
            .as_ref()
            .ok_or_else(|| DeployError::config(format!("artifact {name} has no bytecode")))
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

fn collect_json_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_json_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    Ok(())
}
