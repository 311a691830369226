//! cascade-deploy - Declarative on-chain deployment orchestration.
//!
//! Procedures describe which contracts to deploy and which calls to make, in dependency
//! order. The [`Deployer`] runs them one step at a time through a [`StepExecutor`],
//! extracts the addresses it needs from receipt events, and records the final address
//! graph with a [`DeploymentRecorder`] so later runs can reuse it.

mod artifacts;
pub use artifacts::{Artifact, ArtifactStore};

mod deployer;
pub use deployer::Deployer;

mod error;
pub use error::DeployError;

mod events;
pub use events::{
    DecodedEvent, DepartmentCreated, DepartmentInstalled, DepartmentOwnerCreated, EventShape,
    InstallationPrepared, KnownEvent, extract_events,
};

mod executor;
pub use executor::{DETERMINISTIC_DEPLOYER, RpcExecutor, StepExecutor};

pub mod procedures;
pub use procedures::{Procedure, ProcedureSettings};

mod recorder;
pub use recorder::{DeploymentRecorder, FsRecorder, MemoryRecorder, Snapshot, SnapshotValue};

mod rpc;

mod step;
pub use step::{
    DeployRequest, DeployStep, Deployment, ExecuteRequest, ExecuteStep, ExecutionOverrides,
    LogicalId, Receipt, StepOutcome, StepSettings,
};
