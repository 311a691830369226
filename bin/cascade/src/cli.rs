use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// The procedures that can be started from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ProcedureName {
    /// Department factory and its departments.
    Departments,
    /// Counter singleton and its proxy.
    Counters,
}

#[derive(Parser)]
#[command(name = "cascade")]
#[command(
    author,
    version,
    about = "Deploy and wire on-chain components, and record their addresses for later runs"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "CASCADE_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a deployment procedure and record its addresses.
    Deploy {
        /// The procedure to run.
        procedure: ProcedureName,

        /// Path to the run configuration.
        #[arg(short, long, alias = "conf", env = "CASCADE_CONFIG", default_value = "Cascade.toml")]
        config: PathBuf,

        /// Run every step, even if a snapshot was recorded by a previous run.
        #[arg(long, conflicts_with = "reuse")]
        redeploy: bool,

        /// Return the snapshot recorded by a previous run without running any step.
        ///
        /// Fails if nothing was recorded yet.
        #[arg(long)]
        reuse: bool,
    },

    /// Print a recorded snapshot.
    Show {
        /// Snapshot name, e.g. `latest.json` or `counters.json`.
        snapshot: String,

        /// Directory holding the recorded snapshots.
        #[arg(long, env = "CASCADE_DEPLOYMENTS", default_value = "deployments")]
        deployments: PathBuf,
    },
}

/// `--redeploy` and `--reuse` override the `forceRedeploy` of the configuration.
pub fn force_redeploy(redeploy: bool, reuse: bool) -> Option<bool> {
    match (redeploy, reuse) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deploy_with_reuse() {
        let cli = Cli::try_parse_from(["cascade", "deploy", "counters", "--reuse"])
            .expect("Failed to parse arguments");

        match cli.command {
            Command::Deploy {
                procedure,
                config,
                redeploy,
                reuse,
            } => {
                assert_eq!(procedure, ProcedureName::Counters);
                assert_eq!(config, PathBuf::from("Cascade.toml"));
                assert_eq!(force_redeploy(redeploy, reuse), Some(false));
            }
            other => panic!("Unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_redeploy_conflicts_with_reuse() {
        let result =
            Cli::try_parse_from(["cascade", "deploy", "departments", "--redeploy", "--reuse"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_procedure_is_rejected() {
        let result = Cli::try_parse_from(["cascade", "deploy", "everything"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_force_redeploy_defaults_to_config() {
        assert_eq!(force_redeploy(false, false), None);
        assert_eq!(force_redeploy(true, false), Some(true));
    }
}
