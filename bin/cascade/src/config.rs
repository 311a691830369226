//! Run configuration, read from `Cascade.toml` and `CASCADE_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cascade_deploy::{
    ExecutionOverrides,
    procedures::{CounterDeploymentSettings, DepartmentDeploymentSettings},
};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use url::Url;

/// Environment variables that may override top-level keys of the configuration file.
const ENV_KEYS: [&str; 3] = ["rpc_url", "artifacts", "deployments"];

/// Everything a deployment run needs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunConfig {
    /// JSON-RPC endpoint of the target network.
    pub rpc_url: Url,

    /// Directory of compiled contract artifacts (forge `out/`).
    #[serde(default = "default_artifacts")]
    pub artifacts: PathBuf,

    /// Directory where snapshots are recorded.
    #[serde(default = "default_deployments")]
    pub deployments: PathBuf,

    /// Global overrides, applied below every procedure default.
    #[serde(default)]
    pub overrides: ExecutionOverrides,

    /// Settings of the department system.
    #[serde(default)]
    pub departments: Option<DepartmentDeploymentSettings>,

    /// Settings of the counter system.
    #[serde(default)]
    pub counters: Option<CounterDeploymentSettings>,
}

fn default_artifacts() -> PathBuf {
    PathBuf::from("out")
}

fn default_deployments() -> PathBuf {
    PathBuf::from("deployments")
}

impl RunConfig {
    /// Load the configuration file at `path`, then apply `CASCADE_*` overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file_exact(path))
            .merge(Env::prefixed("CASCADE_").only(&ENV_KEYS))
            .extract()
            .context(format!("Failed to load configuration from {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            rpc_url = %config.rpc_url,
            "Configuration loaded"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const CONFIG: &str = r#"
rpc_url = "http://127.0.0.1:8545"
artifacts = "contracts/out"

[overrides]
gas = 8000000

[counters]
forceRedeploy = true

[counters.counterSettings.overrides]
gas = 200000

[counters.initialCounterValue]
value = "0x2a"
"#;

    #[test]
    fn test_load_config_file() {
        let temp_dir = TempDir::new("cascade-config").expect("Failed to create temp dir");
        let path = temp_dir.path().join("Cascade.toml");
        std::fs::write(&path, CONFIG).expect("Failed to write config");

        let config = RunConfig::load(&path).expect("Failed to load config");

        assert_eq!(config.rpc_url.as_str(), "http://127.0.0.1:8545/");
        assert_eq!(config.artifacts, PathBuf::from("contracts/out"));
        assert_eq!(config.deployments, PathBuf::from("deployments"));
        assert_eq!(config.overrides.gas, Some(8_000_000));
        assert!(config.departments.is_none());

        let counters = config.counters.expect("Counter settings should be present");
        assert_eq!(counters.force_redeploy, Some(true));
        assert_eq!(counters.counter_settings.overrides.gas, Some(200_000));
        assert_eq!(
            counters
                .initial_counter_value
                .map(|initial| initial.value.to::<u64>()),
            Some(42)
        );
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let temp_dir = TempDir::new("cascade-config").expect("Failed to create temp dir");
        let result = RunConfig::load(&temp_dir.path().join("Cascade.toml"));
        assert!(result.is_err());
    }
}
