//! Step model: logical ids, execution overrides and the two step kinds.
//!
//! A step is one irreversible on-chain action, either the creation of a new contract
//! instance ([`DeployStep`]) or a state-changing call on an existing one ([`ExecuteStep`]).
//! Procedures fill in the identity of a step (contract, arguments, target) and two
//! override layers; the [`crate::Deployer`] adds the global run layer and resolves them
//! into the request handed to the [`crate::StepExecutor`].
//!
//! Override precedence, lowest to highest:
//! 1. global run overrides (from the run configuration),
//! 2. procedure defaults ([`DeployStep::defaults`]),
//! 3. caller overrides ([`DeployStep::overrides`]).
//!
//! The merge is shallow: a field set in a higher layer replaces the lower one as a whole.

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Log, U256},
};
use derive_more::{Deref, Display};
use serde::{Deserialize, Serialize};

/// Human-readable identifier of one step within a deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Deref, Display)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl From<&str> for LogicalId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for LogicalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Network and execution parameters of a step.
///
/// These are opaque to the orchestrator and only forwarded to the executor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionOverrides {
    /// Account submitting the transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    /// Gas limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,
    /// Legacy gas price in wei.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u64>,
    /// Explicit nonce.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    /// Native value sent with the transaction, in wei.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
}

impl ExecutionOverrides {
    /// Layer `higher` on top of `self`. Fields set in `higher` win.
    pub fn merge(&self, higher: &Self) -> Self {
        Self {
            from: higher.from.or(self.from),
            gas: higher.gas.or(self.gas),
            gas_price: higher.gas_price.or(self.gas_price),
            nonce: higher.nonce.or(self.nonce),
            value: higher.value.or(self.value),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn gas(mut self, gas: u64) -> Self {
        self.gas = Some(gas);
        self
    }

    pub fn value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    pub fn from_address(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }
}

/// A contract creation, as filled in by a procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployStep {
    id: LogicalId,
    contract: String,
    args: Vec<DynSolValue>,
    salt: Option<B256>,
    defaults: ExecutionOverrides,
    overrides: ExecutionOverrides,
}

impl DeployStep {
    pub fn new(id: impl Into<LogicalId>, contract: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            contract: contract.into(),
            args: Vec::new(),
            salt: None,
            defaults: ExecutionOverrides::default(),
            overrides: ExecutionOverrides::default(),
        }
    }

    /// Set the constructor arguments, in declaration order.
    pub fn args(mut self, args: impl IntoIterator<Item = DynSolValue>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    /// Deploy through the deterministic CREATE2 deployer with this salt.
    pub fn salt(mut self, salt: B256) -> Self {
        self.salt = Some(salt);
        self
    }

    /// Procedure-level defaults, overridden by caller overrides.
    pub fn defaults(mut self, defaults: ExecutionOverrides) -> Self {
        self.defaults = defaults;
        self
    }

    /// Caller-supplied overrides, the highest precedence layer.
    pub fn overrides(mut self, overrides: ExecutionOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn id(&self) -> &LogicalId {
        &self.id
    }

    /// Resolve the override layers on top of the global run overrides.
    pub fn resolve(self, global: &ExecutionOverrides) -> DeployRequest {
        DeployRequest {
            overrides: global.merge(&self.defaults).merge(&self.overrides),
            id: self.id,
            contract: self.contract,
            args: self.args,
            salt: self.salt,
        }
    }
}

/// A state-changing call on an existing contract, as filled in by a procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteStep {
    id: LogicalId,
    abi: String,
    to: Address,
    function: String,
    args: Vec<DynSolValue>,
    defaults: ExecutionOverrides,
    overrides: ExecutionOverrides,
}

impl ExecuteStep {
    pub fn new(
        id: impl Into<LogicalId>,
        abi: impl Into<String>,
        to: Address,
        function: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            abi: abi.into(),
            to,
            function: function.into(),
            args: Vec::new(),
            defaults: ExecutionOverrides::default(),
            overrides: ExecutionOverrides::default(),
        }
    }

    /// Set the call arguments, in declaration order.
    pub fn args(mut self, args: impl IntoIterator<Item = DynSolValue>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    /// Procedure-level defaults, overridden by caller overrides.
    pub fn defaults(mut self, defaults: ExecutionOverrides) -> Self {
        self.defaults = defaults;
        self
    }

    /// Caller-supplied overrides, the highest precedence layer.
    pub fn overrides(mut self, overrides: ExecutionOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn id(&self) -> &LogicalId {
        &self.id
    }

    /// Resolve the override layers on top of the global run overrides.
    pub fn resolve(self, global: &ExecutionOverrides) -> ExecuteRequest {
        ExecuteRequest {
            overrides: global.merge(&self.defaults).merge(&self.overrides),
            id: self.id,
            abi: self.abi,
            to: self.to,
            function: self.function,
            args: self.args,
        }
    }
}

/// Fully resolved contract creation handed to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployRequest {
    pub id: LogicalId,
    /// Artifact name of the contract to deploy.
    pub contract: String,
    pub args: Vec<DynSolValue>,
    pub salt: Option<B256>,
    pub overrides: ExecutionOverrides,
}

/// Fully resolved contract call handed to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteRequest {
    pub id: LogicalId,
    /// Artifact name of the ABI used to encode the call.
    pub abi: String,
    pub to: Address,
    pub function: String,
    pub args: Vec<DynSolValue>,
    pub overrides: ExecutionOverrides,
}

/// One step of a procedure. A step is exactly one of the two kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum StepSettings {
    Deploy(DeployStep),
    Execute(ExecuteStep),
}

impl StepSettings {
    pub fn id(&self) -> &LogicalId {
        match self {
            Self::Deploy(step) => step.id(),
            Self::Execute(step) => step.id(),
        }
    }
}

impl From<DeployStep> for StepSettings {
    fn from(step: DeployStep) -> Self {
        Self::Deploy(step)
    }
}

impl From<ExecuteStep> for StepSettings {
    fn from(step: ExecuteStep) -> Self {
        Self::Execute(step)
    }
}

/// Confirmation artifact of a step, with the emitted logs in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Receipt {
    pub transaction_hash: B256,
    pub logs: Vec<Log>,
}

/// Result of a confirmed contract creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    pub address: Address,
    pub receipt: Receipt,
}

/// Result of a confirmed step, mirroring [`StepSettings`].
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Deployed(Deployment),
    Executed(Receipt),
}

impl StepOutcome {
    pub fn receipt(&self) -> &Receipt {
        match self {
            Self::Deployed(deployment) => &deployment.receipt,
            Self::Executed(receipt) => receipt,
        }
    }

    /// The created address, for deploy steps.
    pub fn address(&self) -> Option<Address> {
        match self {
            Self::Deployed(deployment) => Some(deployment.address),
            Self::Executed(_) => None,
        }
    }
}
