//! Department system: a department factory and the departments created through it.

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes, keccak256},
};
use serde::{Deserialize, Serialize};

use super::{Procedure, ProcedureSettings};
use crate::{
    DeployError, DeployStep, Deployer, DeploymentRecorder, DepartmentCreated,
    DepartmentOwnerCreated, ExecuteStep, ExecutionOverrides, InstallationPrepared, LogicalId,
    StepExecutor,
};

/// Settings of the department owner the factory creates in its constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentOwnerSettings {
    pub metadata: Bytes,
    pub token_voting: Address,
    pub token: Address,
    pub trustless_management: Address,
}

impl DepartmentOwnerSettings {
    /// ABI tuple in struct field order.
    fn to_abi(&self) -> DynSolValue {
        DynSolValue::Tuple(vec![
            DynSolValue::Bytes(self.metadata.to_vec()),
            DynSolValue::Address(self.token_voting),
            DynSolValue::Address(self.token),
            DynSolValue::Address(self.trustless_management),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentFactorySettings {
    pub plugin_setup_processor: Address,
    pub tag_voting_repo: Address,
    pub tag_manager: Address,
    pub trustless_management: Address,
    pub address_trustless_management: Address,
    pub optimistic_actions: Address,
    #[serde(rename = "openRD")]
    pub open_rd: Address,
    pub department_owner_settings: DepartmentOwnerSettings,
    #[serde(default)]
    pub overrides: ExecutionOverrides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentFactoryDeployment {
    pub department_factory: Address,
    pub department_owner: Address,
}

/// Deploy the `DepartmentFactory` and read the department owner it created.
pub async fn deploy_department_factory<E, R>(
    deployer: &mut Deployer<E, R>,
    settings: &DepartmentFactorySettings,
    defaults: &ExecutionOverrides,
) -> Result<DepartmentFactoryDeployment, DeployError>
where
    E: StepExecutor,
    R: DeploymentRecorder,
{
    let step = DeployStep::new("DepartmentFactory", "DepartmentFactory")
        .args([
            DynSolValue::Address(settings.plugin_setup_processor),
            DynSolValue::Address(settings.tag_voting_repo),
            DynSolValue::Address(settings.tag_manager),
            DynSolValue::Address(settings.trustless_management),
            DynSolValue::Address(settings.address_trustless_management),
            DynSolValue::Address(settings.optimistic_actions),
            DynSolValue::Address(settings.open_rd),
            settings.department_owner_settings.to_abi(),
        ])
        .defaults(defaults.clone())
        .overrides(settings.overrides.clone());
    let id = step.id().clone();

    let deployment = deployer.deploy(step).await?;
    let owner: DepartmentOwnerCreated = deployer.expect_event(
        &id,
        "DepartmentFactory",
        Some(deployment.address),
        &deployment.receipt,
    )?;

    tracing::info!(
        department_factory = %deployment.address,
        department_owner = %owner.department_owner,
        "Department factory deployed"
    );
    Ok(DepartmentFactoryDeployment {
        department_factory: deployment.address,
        department_owner: owner.department_owner,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentSettings {
    /// Department name. Its keccak256 hash is the department tag.
    pub name: String,
    pub department_factory: Address,
    /// Emitter of `InstallationPrepared`. Any emitter is accepted when unknown.
    #[serde(default)]
    pub plugin_setup_processor: Option<Address>,
    #[serde(default)]
    pub overrides: ExecutionOverrides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentAddresses {
    pub dao: Address,
    pub tag_voting: Address,
}

/// Create a department through the factory with empty metadata, then read its DAO and
/// tag-voting plugin.
pub async fn deploy_department<E, R>(
    deployer: &mut Deployer<E, R>,
    settings: &DepartmentSettings,
    defaults: &ExecutionOverrides,
) -> Result<DepartmentAddresses, DeployError>
where
    E: StepExecutor,
    R: DeploymentRecorder,
{
    let tag = keccak256(settings.name.as_bytes());
    let id = LogicalId::new(format!("Department{}", settings.name));

    let receipt = deployer
        .execute(
            ExecuteStep::new(
                id.clone(),
                "DepartmentFactory",
                settings.department_factory,
                "createDepartment",
            )
            .args([DynSolValue::Bytes(Vec::new()), DynSolValue::FixedBytes(tag, 32)])
            .defaults(defaults.clone())
            .overrides(settings.overrides.clone()),
        )
        .await?;

    let created: DepartmentCreated = deployer.expect_event(
        &id,
        "DepartmentFactory",
        Some(settings.department_factory),
        &receipt,
    )?;
    let installation: InstallationPrepared = deployer.expect_event(
        &id,
        "PluginSetupProcessor",
        settings.plugin_setup_processor,
        &receipt,
    )?;

    tracing::info!(
        name = %settings.name,
        dao = %created.department,
        tag_voting = %installation.plugin,
        "Department created"
    );
    Ok(DepartmentAddresses {
        dao: created.department,
        tag_voting: installation.plugin,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartAccountDepartmentInstallerSettings {
    pub smart_account_trustless_execution: Address,
    pub tag_trustless_management: Address,
    pub address_trustless_management: Address,
    pub optimistic_actions: Address,
    #[serde(rename = "openRD")]
    pub open_rd: Address,
    #[serde(default)]
    pub overrides: ExecutionOverrides,
}

pub async fn deploy_smart_account_department_installer<E, R>(
    deployer: &mut Deployer<E, R>,
    settings: &SmartAccountDepartmentInstallerSettings,
    defaults: &ExecutionOverrides,
) -> Result<Address, DeployError>
where
    E: StepExecutor,
    R: DeploymentRecorder,
{
    let deployment = deployer
        .deploy(
            DeployStep::new(
                "SmartAccountDepartmentInstaller",
                "SmartAccountDepartmentInstaller",
            )
            .args([
                DynSolValue::Address(settings.smart_account_trustless_execution),
                DynSolValue::Address(settings.tag_trustless_management),
                DynSolValue::Address(settings.address_trustless_management),
                DynSolValue::Address(settings.optimistic_actions),
                DynSolValue::Address(settings.open_rd),
            ])
            .defaults(defaults.clone())
            .overrides(settings.overrides.clone()),
        )
        .await?;
    Ok(deployment.address)
}

/// Settings applied to every department of the system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SharedDepartmentSettings {
    /// Defaults to the factory's plugin setup processor.
    pub plugin_setup_processor: Option<Address>,
    pub overrides: ExecutionOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DepartmentDeploymentSettings {
    pub force_redeploy: Option<bool>,
    /// Defaults for every step of the procedure.
    pub overrides: ExecutionOverrides,
    /// Required for a full run, unused when the recorded snapshot is reused.
    pub department_factory_settings: Option<DepartmentFactorySettings>,
    pub department_settings: SharedDepartmentSettings,
    /// The installer is only deployed when these are given.
    pub smart_account_department_installer_settings:
        Option<SmartAccountDepartmentInstallerSettings>,
}

impl ProcedureSettings for DepartmentDeploymentSettings {
    fn force_redeploy(&self) -> Option<bool> {
        self.force_redeploy
    }

    fn set_force_redeploy(&mut self, force_redeploy: Option<bool>) {
        self.force_redeploy = force_redeploy;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentDeployment {
    pub department_factory: DepartmentFactoryDeployment,
    pub dispute_department: DepartmentAddresses,
    pub core_member_department: DepartmentAddresses,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smart_account_department_installer: Option<Address>,
}

/// Departments created by [`DepartmentSystem`], in creation order.
pub const DEPARTMENT_NAMES: [&str; 2] = ["DISPUTE", "CORE_MEMBER"];

/// Factory, then the `DISPUTE` and `CORE_MEMBER` departments created through it,
/// then the optional smart-account department installer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepartmentSystem;

impl Procedure for DepartmentSystem {
    const NAME: &'static str = "DepartmentSystem";
    const SNAPSHOT_NAME: &'static str = "latest.json";

    type Settings = DepartmentDeploymentSettings;
    type Output = DepartmentDeployment;

    async fn steps<E, R>(
        &self,
        deployer: &mut Deployer<E, R>,
        settings: &Self::Settings,
    ) -> Result<Self::Output, DeployError>
    where
        E: StepExecutor,
        R: DeploymentRecorder,
    {
        let factory_settings = settings.department_factory_settings.as_ref().ok_or_else(|| {
            DeployError::config(format!(
                "{} needs departmentFactorySettings to deploy",
                Self::NAME
            ))
        })?;
        let department_factory =
            deploy_department_factory(deployer, factory_settings, &settings.overrides).await?;

        let shared = &settings.department_settings;
        let plugin_setup_processor = shared
            .plugin_setup_processor
            .unwrap_or(factory_settings.plugin_setup_processor);

        let [dispute, core_member] = DEPARTMENT_NAMES.map(|name| DepartmentSettings {
            name: name.to_string(),
            department_factory: department_factory.department_factory,
            plugin_setup_processor: Some(plugin_setup_processor),
            overrides: shared.overrides.clone(),
        });
        let dispute_department =
            deploy_department(deployer, &dispute, &settings.overrides).await?;
        let core_member_department =
            deploy_department(deployer, &core_member, &settings.overrides).await?;

        let smart_account_department_installer =
            match &settings.smart_account_department_installer_settings {
                Some(installer) => Some(
                    deploy_smart_account_department_installer(
                        deployer,
                        installer,
                        &settings.overrides,
                    )
                    .await?,
                ),
                None => None,
            };

        Ok(DepartmentDeployment {
            department_factory,
            dispute_department,
            core_member_department,
            smart_account_department_installer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_department_owner_settings_encode_in_field_order() {
        let settings = DepartmentOwnerSettings {
            metadata: Bytes::from_static(b"ipfs://owner"),
            token_voting: Address::repeat_byte(0x01),
            token: Address::repeat_byte(0x02),
            trustless_management: Address::repeat_byte(0x03),
        };

        let DynSolValue::Tuple(fields) = settings.to_abi() else {
            panic!("Expected a tuple");
        };
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0], DynSolValue::Bytes(b"ipfs://owner".to_vec()));
        assert_eq!(fields[3], DynSolValue::Address(Address::repeat_byte(0x03)));
    }

    #[test]
    fn test_settings_parse_camel_case_with_open_rd() {
        let settings: DepartmentDeploymentSettings = serde_json::from_value(serde_json::json!({
            "forceRedeploy": true,
            "departmentFactorySettings": {
                "pluginSetupProcessor": "0x0000000000000000000000000000000000000001",
                "tagVotingRepo": "0x0000000000000000000000000000000000000002",
                "tagManager": "0x0000000000000000000000000000000000000003",
                "trustlessManagement": "0x0000000000000000000000000000000000000004",
                "addressTrustlessManagement": "0x0000000000000000000000000000000000000005",
                "optimisticActions": "0x0000000000000000000000000000000000000006",
                "openRD": "0x0000000000000000000000000000000000000007",
                "departmentOwnerSettings": {
                    "metadata": "0x",
                    "tokenVoting": "0x0000000000000000000000000000000000000008",
                    "token": "0x0000000000000000000000000000000000000009",
                    "trustlessManagement": "0x000000000000000000000000000000000000000a"
                },
                "overrides": {"gas": 5000000}
            }
        }))
        .expect("Failed to parse settings");

        assert_eq!(settings.force_redeploy(), Some(true));
        let factory = settings
            .department_factory_settings
            .as_ref()
            .expect("Factory settings should be present");
        assert_eq!(factory.open_rd, Address::with_last_byte(7));
        assert_eq!(factory.overrides.gas, Some(5_000_000));
        assert!(settings.smart_account_department_installer_settings.is_none());
        assert_eq!(settings.department_settings, SharedDepartmentSettings::default());
    }

    #[test]
    fn test_reuse_only_settings_parse() {
        let settings: DepartmentDeploymentSettings =
            serde_json::from_str(r#"{"forceRedeploy": false}"#)
                .expect("Reuse needs no factory settings");

        assert_eq!(settings.force_redeploy(), Some(false));
        assert!(settings.department_factory_settings.is_none());
    }

    #[test]
    fn test_deployment_without_installer_omits_role() {
        let deployment = DepartmentDeployment {
            department_factory: DepartmentFactoryDeployment {
                department_factory: Address::with_last_byte(1),
                department_owner: Address::with_last_byte(2),
            },
            dispute_department: DepartmentAddresses {
                dao: Address::with_last_byte(3),
                tag_voting: Address::with_last_byte(4),
            },
            core_member_department: DepartmentAddresses {
                dao: Address::with_last_byte(5),
                tag_voting: Address::with_last_byte(6),
            },
            smart_account_department_installer: None,
        };

        let snapshot = crate::Snapshot::from_output(&deployment).expect("Failed to convert");
        assert!(snapshot.get("smartAccountDepartmentInstaller").is_none());
        assert_eq!(
            snapshot
                .nested("coreMemberDepartment")
                .and_then(|department| department.address("tagVoting")),
            Some(Address::with_last_byte(6))
        );

        let restored: DepartmentDeployment =
            snapshot.into_output().expect("Failed to convert back");
        assert_eq!(restored, deployment);
    }
}
