//! Orchestration context shared by every procedure of a deployment run.

use std::{collections::HashSet, sync::Arc};

use alloy_core::primitives::Address;
use serde::{Serialize, de::DeserializeOwned};
use tracing::Instrument;

use crate::{
    ArtifactStore, DecodedEvent, DeployError, DeployStep, Deployment, DeploymentRecorder,
    EventShape, ExecuteStep, ExecutionOverrides, LogicalId, Procedure, ProcedureSettings,
    Receipt, Snapshot, StepExecutor, StepOutcome, StepSettings, extract_events,
};

/// Drives procedures against a step executor and records their results.
///
/// Steps run strictly one after the other. The deployer keeps no state besides the
/// logical ids used in the current run, which must be unique.
pub struct Deployer<E, R> {
    executor: E,
    recorder: R,
    artifacts: Arc<ArtifactStore>,
    overrides: ExecutionOverrides,
    used_ids: HashSet<LogicalId>,
}

impl<E, R> Deployer<E, R>
where
    E: StepExecutor,
    R: DeploymentRecorder,
{
    pub fn new(executor: E, recorder: R, artifacts: Arc<ArtifactStore>) -> Self {
        Self {
            executor,
            recorder,
            artifacts,
            overrides: ExecutionOverrides::default(),
            used_ids: HashSet::new(),
        }
    }

    /// Global run overrides, the lowest precedence layer of every step.
    pub fn with_overrides(mut self, overrides: ExecutionOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Run a top-level procedure.
    ///
    /// With `force_redeploy` explicitly `false` the recorded snapshot is returned and no
    /// step runs; a missing snapshot is an error, never a fallback to a full run.
    /// Otherwise settings are required, every step runs in order and the result is
    /// recorded only once all of them succeeded.
    pub async fn run<P: Procedure>(
        &mut self,
        procedure: &P,
        settings: Option<&P::Settings>,
    ) -> Result<P::Output, DeployError> {
        if settings.and_then(|settings| settings.force_redeploy()) == Some(false) {
            tracing::info!(
                procedure = P::NAME,
                snapshot = P::SNAPSHOT_NAME,
                "Reusing recorded deployment, skipping all steps"
            );
            return self.load(P::SNAPSHOT_NAME).await;
        }

        let settings = settings.ok_or_else(|| {
            DeployError::config(format!("no settings provided for {}", P::NAME))
        })?;

        self.used_ids.clear();
        tracing::info!(procedure = P::NAME, "Starting deployment procedure...");

        let output = procedure
            .steps(self, settings)
            .instrument(tracing::info_span!("procedure", name = P::NAME))
            .await?;

        self.save(P::SNAPSHOT_NAME, &output).await?;
        tracing::info!(
            procedure = P::NAME,
            steps = self.used_ids.len(),
            snapshot = P::SNAPSHOT_NAME,
            "Deployment procedure complete"
        );
        Ok(output)
    }

    /// Deploy a contract and return its address with the confirmed receipt.
    pub async fn deploy(&mut self, step: DeployStep) -> Result<Deployment, DeployError> {
        self.register(step.id())?;
        let request = step.resolve(&self.overrides);
        let id = request.id.clone();

        self.executor
            .deploy(request)
            .instrument(tracing::info_span!("step", id = %id))
            .await
            .map_err(|err| step_failure(&id, err))
    }

    /// Call a function on an existing contract and return the confirmed receipt.
    pub async fn execute(&mut self, step: ExecuteStep) -> Result<Receipt, DeployError> {
        self.register(step.id())?;
        let request = step.resolve(&self.overrides);
        let id = request.id.clone();

        self.executor
            .execute(request)
            .instrument(tracing::info_span!("step", id = %id))
            .await
            .map_err(|err| step_failure(&id, err))
    }

    /// Run either kind of step.
    pub async fn run_step(&mut self, step: StepSettings) -> Result<StepOutcome, DeployError> {
        match step {
            StepSettings::Deploy(step) => self.deploy(step).await.map(StepOutcome::Deployed),
            StepSettings::Execute(step) => self.execute(step).await.map(StepOutcome::Executed),
        }
    }

    /// Decode every `event_name` log of `receipt` using the ABI registered as `abi`.
    pub fn events(
        &self,
        abi: &str,
        address: Option<Address>,
        event_name: &str,
        receipt: &Receipt,
    ) -> Result<Vec<DecodedEvent>, DeployError> {
        extract_events(self.artifacts.abi(abi)?, address, event_name, &receipt.logs)
    }

    /// First occurrence of the event `T` in the receipt of `step`.
    ///
    /// Zero occurrences means the contract did not behave as the procedure relies on.
    pub fn expect_event<T: EventShape>(
        &self,
        step: &LogicalId,
        abi: &str,
        address: Option<Address>,
        receipt: &Receipt,
    ) -> Result<T, DeployError> {
        let events = self.events(abi, address, T::NAME, receipt)?;
        let Some(first) = events.first() else {
            tracing::error!(id = %step, event = T::NAME, "Expected event was not emitted");
            return Err(DeployError::ProtocolViolation {
                step: step.clone(),
                event: T::NAME.to_string(),
            });
        };
        T::decode(first)
    }

    /// Record `output` under `name`.
    pub async fn save<T: Serialize>(&self, name: &str, output: &T) -> Result<Snapshot, DeployError> {
        let snapshot = Snapshot::from_output(output).map_err(|err| DeployError::Recorder {
            name: name.to_string(),
            source: err.into(),
        })?;
        self.recorder.save(name, &snapshot).await?;
        Ok(snapshot)
    }

    /// Read back the output recorded under `name`.
    pub async fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T, DeployError> {
        self.recorder
            .load(name)
            .await?
            .into_output()
            .map_err(|err| DeployError::Recorder {
                name: name.to_string(),
                source: err.into(),
            })
    }

    fn register(&mut self, id: &LogicalId) -> Result<(), DeployError> {
        if !self.used_ids.insert(id.clone()) {
            return Err(DeployError::config(format!(
                "logical id {id} is used twice in this run"
            )));
        }
        Ok(())
    }
}

/// Tag every executor failure with the step it belongs to.
fn step_failure(id: &LogicalId, err: anyhow::Error) -> DeployError {
    match err.downcast::<DeployError>() {
        Ok(DeployError::Configuration(message)) => {
            tracing::error!(id = %id, error = %message, "Step is misconfigured");
            DeployError::InvalidStep {
                step: id.clone(),
                message,
            }
        }
        Ok(err) => err,
        Err(source) => {
            tracing::error!(id = %id, error = %source, "Step failed");
            DeployError::Transport {
                step: id.clone(),
                source,
            }
        }
    }
}
