//! Composite deployment procedures.
//!
//! Leaf procedures wrap a single step and are plain async functions taking the
//! [`Deployer`]. Top-level procedures implement [`Procedure`] and are started with
//! [`Deployer::run`], which owns the resume check and the final snapshot.

use std::future::Future;

use serde::{Serialize, de::DeserializeOwned};

use crate::{DeployError, Deployer, DeploymentRecorder, StepExecutor};

pub mod counters;
pub mod departments;

pub use counters::{
    CounterDeployment, CounterDeploymentSettings, CounterSystem, DeployCounterSettings,
    DeployProxyCounterSettings, InitialCounterValue, SetInitialCounterValueSettings,
    deploy_counter, deploy_proxy_counter, set_initial_counter_value,
};
pub use departments::{
    DepartmentAddresses, DepartmentDeployment, DepartmentDeploymentSettings,
    DepartmentFactoryDeployment, DepartmentFactorySettings, DepartmentOwnerSettings,
    DepartmentSettings, DepartmentSystem, SharedDepartmentSettings,
    SmartAccountDepartmentInstallerSettings, deploy_department, deploy_department_factory,
    deploy_smart_account_department_installer,
};

/// Settings of a top-level procedure.
pub trait ProcedureSettings {
    /// `Some(false)` reuses the recorded snapshot. `None` and `Some(true)` run every step.
    fn force_redeploy(&self) -> Option<bool>;

    fn set_force_redeploy(&mut self, force_redeploy: Option<bool>);
}

/// A top-level procedure whose result is recorded under a snapshot name.
pub trait Procedure {
    /// Name used in logs and errors.
    const NAME: &'static str;

    /// Name of the snapshot the output is recorded under.
    const SNAPSHOT_NAME: &'static str;

    type Settings: ProcedureSettings;

    /// Aggregated addresses. Converted to and from a [`crate::Snapshot`] through serde.
    type Output: Serialize + DeserializeOwned;

    /// Run every step in dependency order.
    fn steps<E, R>(
        &self,
        deployer: &mut Deployer<E, R>,
        settings: &Self::Settings,
    ) -> impl Future<Output = Result<Self::Output, DeployError>>
    where
        E: StepExecutor,
        R: DeploymentRecorder;
}
