//! cascade is a CLI tool to deploy and wire on-chain components, and to record their
//! addresses so later runs can reuse them.

mod cli;
mod config;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use cascade_deploy::{
    ArtifactStore, Deployer, DeploymentRecorder, FsRecorder, RpcExecutor, Snapshot,
    procedures::{CounterSystem, DepartmentSystem, ProcedureSettings},
};
use clap::Parser;
use comfy_table::Table;

use cli::{Cli, Command, ProcedureName, force_redeploy};
use config::RunConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match cli.command {
        Command::Deploy {
            procedure,
            config,
            redeploy,
            reuse,
        } => {
            let config = RunConfig::load(&config)?;
            let snapshot = deploy(config, procedure, force_redeploy(redeploy, reuse)).await?;
            println!("{}", snapshot_table(&snapshot));
        }
        Command::Show {
            snapshot,
            deployments,
        } => {
            let recorded = FsRecorder::new(deployments).load(&snapshot).await?;
            println!("{}", snapshot_table(&recorded));
        }
    }

    Ok(())
}

async fn deploy(
    config: RunConfig,
    procedure: ProcedureName,
    force_redeploy: Option<bool>,
) -> Result<Snapshot> {
    let artifacts = Arc::new(load_artifacts(&config.artifacts)?);
    let executor = RpcExecutor::new(config.rpc_url.clone(), artifacts.clone())?;
    let recorder = FsRecorder::new(&config.deployments);
    let mut deployer =
        Deployer::new(executor, recorder, artifacts).with_overrides(config.overrides.clone());

    tracing::info!(
        %procedure,
        rpc_url = %config.rpc_url,
        deployments = %config.deployments.display(),
        "Starting deployment..."
    );

    let snapshot = match procedure {
        ProcedureName::Departments => {
            let settings = apply_force_redeploy(config.departments, force_redeploy);
            let deployment = deployer.run(&DepartmentSystem, settings.as_ref()).await?;
            Snapshot::from_output(&deployment)
        }
        ProcedureName::Counters => {
            let settings = apply_force_redeploy(config.counters, force_redeploy);
            let deployment = deployer.run(&CounterSystem, settings.as_ref()).await?;
            Snapshot::from_output(&deployment)
        }
    };

    let snapshot = snapshot.context("Failed to convert deployment to a snapshot")?;
    tracing::info!(%procedure, "Deployment complete");
    Ok(snapshot)
}

/// Apply the command-line `forceRedeploy` to the configured settings.
///
/// Reusing a snapshot needs no other setting, so `--reuse` works without a procedure
/// table in the configuration.
fn apply_force_redeploy<S>(settings: Option<S>, force_redeploy: Option<bool>) -> Option<S>
where
    S: ProcedureSettings + Default,
{
    match force_redeploy {
        None => settings,
        Some(false) => {
            let mut settings = settings.unwrap_or_default();
            settings.set_force_redeploy(Some(false));
            Some(settings)
        }
        Some(true) => settings.map(|mut settings| {
            settings.set_force_redeploy(Some(true));
            settings
        }),
    }
}

/// A missing directory yields an empty store. Steps that need an artifact then fail with
/// a configuration error.
fn load_artifacts(path: &Path) -> Result<ArtifactStore> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "Artifacts directory not found, no artifact loaded");
        return Ok(ArtifactStore::new());
    }
    ArtifactStore::load_dir(path)
}

fn snapshot_table(snapshot: &Snapshot) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Role", "Address"]);
    for (role, address) in snapshot.flatten() {
        table.add_row(vec![role, address.to_checksum(None)]);
    }
    table
}
