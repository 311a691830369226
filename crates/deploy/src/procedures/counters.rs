//! Counter example system: a deterministic counter singleton and a proxy bound to it.

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, U256, b256},
};
use serde::{Deserialize, Serialize};

use super::{Procedure, ProcedureSettings};
use crate::{
    DeployError, DeployStep, Deployer, Deployment, DeploymentRecorder, ExecuteStep,
    ExecutionOverrides, Receipt, StepExecutor,
};

/// Fixed salt of the counter singleton, so it lands on the same address on every network.
pub const COUNTER_SALT: B256 =
    b256!("0x07208e7ecf628e1095711165b8ef16d18539fa71b914042fec53d63c160c216c");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeployCounterSettings {
    pub overrides: ExecutionOverrides,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetInitialCounterValueSettings {
    pub counter: Address,
    pub counter_value: U256,
    #[serde(default)]
    pub overrides: ExecutionOverrides,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployProxyCounterSettings {
    pub counter: Address,
    #[serde(default)]
    pub overrides: ExecutionOverrides,
}

/// Deploy the `Counter` singleton through the deterministic deployer.
pub async fn deploy_counter<E, R>(
    deployer: &mut Deployer<E, R>,
    settings: &DeployCounterSettings,
    defaults: &ExecutionOverrides,
) -> Result<Deployment, DeployError>
where
    E: StepExecutor,
    R: DeploymentRecorder,
{
    deployer
        .deploy(
            DeployStep::new("Counter", "Counter")
                .salt(COUNTER_SALT)
                .defaults(defaults.clone())
                .overrides(settings.overrides.clone()),
        )
        .await
}

/// Call `Counter.setNumber` with the initial value.
pub async fn set_initial_counter_value<E, R>(
    deployer: &mut Deployer<E, R>,
    settings: &SetInitialCounterValueSettings,
    defaults: &ExecutionOverrides,
) -> Result<Receipt, DeployError>
where
    E: StepExecutor,
    R: DeploymentRecorder,
{
    deployer
        .execute(
            ExecuteStep::new("InitialCounterNumber", "Counter", settings.counter, "setNumber")
                .args([DynSolValue::Uint(settings.counter_value, 256)])
                .defaults(defaults.clone())
                .overrides(settings.overrides.clone()),
        )
        .await
}

/// Deploy a `ProxyCounter` forwarding to `settings.counter`.
pub async fn deploy_proxy_counter<E, R>(
    deployer: &mut Deployer<E, R>,
    settings: &DeployProxyCounterSettings,
    defaults: &ExecutionOverrides,
) -> Result<Deployment, DeployError>
where
    E: StepExecutor,
    R: DeploymentRecorder,
{
    deployer
        .deploy(
            DeployStep::new("ProxyCounter", "ProxyCounter")
                .args([DynSolValue::Address(settings.counter)])
                .defaults(defaults.clone())
                .overrides(settings.overrides.clone()),
        )
        .await
}

/// Initial value written to the counter after deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialCounterValue {
    pub value: U256,
    #[serde(default)]
    pub overrides: ExecutionOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CounterDeploymentSettings {
    pub force_redeploy: Option<bool>,
    /// Defaults for every step of the procedure.
    pub overrides: ExecutionOverrides,
    pub counter_settings: DeployCounterSettings,
    /// Skipped when absent.
    pub initial_counter_value: Option<InitialCounterValue>,
    pub proxy_counter_overrides: ExecutionOverrides,
}

impl ProcedureSettings for CounterDeploymentSettings {
    fn force_redeploy(&self) -> Option<bool> {
        self.force_redeploy
    }

    fn set_force_redeploy(&mut self, force_redeploy: Option<bool>) {
        self.force_redeploy = force_redeploy;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterDeployment {
    pub counter: Address,
    pub proxy_counter: Address,
}

/// Counter, optional initial value, then a proxy bound to the counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterSystem;

impl Procedure for CounterSystem {
    const NAME: &'static str = "CounterSystem";
    const SNAPSHOT_NAME: &'static str = "counters.json";

    type Settings = CounterDeploymentSettings;
    type Output = CounterDeployment;

    async fn steps<E, R>(
        &self,
        deployer: &mut Deployer<E, R>,
        settings: &Self::Settings,
    ) -> Result<Self::Output, DeployError>
    where
        E: StepExecutor,
        R: DeploymentRecorder,
    {
        let counter = deploy_counter(deployer, &settings.counter_settings, &settings.overrides)
            .await?
            .address;

        if let Some(initial) = &settings.initial_counter_value {
            set_initial_counter_value(
                deployer,
                &SetInitialCounterValueSettings {
                    counter,
                    counter_value: initial.value,
                    overrides: initial.overrides.clone(),
                },
                &settings.overrides,
            )
            .await?;
        }

        let proxy_counter = deploy_proxy_counter(
            deployer,
            &DeployProxyCounterSettings {
                counter,
                overrides: settings.proxy_counter_overrides.clone(),
            },
            &settings.overrides,
        )
        .await?
        .address;

        Ok(CounterDeployment {
            counter,
            proxy_counter,
        })
    }
}
