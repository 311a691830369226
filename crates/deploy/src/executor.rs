//! Step execution boundary.
//!
//! [`StepExecutor`] is the execution primitive the [`crate::Deployer`] drives: it submits one
//! resolved step and returns only once that step is confirmed. [`RpcExecutor`] implements it
//! against a JSON-RPC node with unlocked accounts (anvil, hardhat, geth `--dev`).

use std::{future::Future, sync::Arc, time::Duration};

use alloy_core::{
    dyn_abi::JsonAbiExt,
    primitives::{Address, B256, Bytes, Log, U64, U256, address},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    ArtifactStore, DeployRequest, Deployment, ExecuteRequest, ExecutionOverrides, Receipt,
    rpc::{create_client, json_rpc_call, poll_until},
};

/// The deterministic CREATE2 deployer available on dev nodes and most public networks.
pub const DETERMINISTIC_DEPLOYER: Address = address!("0x4e59b44847b379578588920cA78FbF26c0B4956C");

/// Default time to wait for a transaction receipt.
const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Default interval between receipt polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Submits steps and waits for their confirmation.
///
/// Implementations must not return before the step is confirmed, and must report a
/// reverted or dropped step as an error.
pub trait StepExecutor {
    /// Create a new contract instance.
    fn deploy(&self, request: DeployRequest) -> impl Future<Output = Result<Deployment>> + Send;

    /// Call a state-changing function on an existing instance.
    fn execute(&self, request: ExecuteRequest) -> impl Future<Output = Result<Receipt>> + Send;
}

/// Executor backed by `eth_sendTransaction` on a JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcExecutor {
    client: reqwest::Client,
    url: Url,
    artifacts: Arc<ArtifactStore>,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl RpcExecutor {
    pub fn new(url: Url, artifacts: Arc<ArtifactStore>) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            url,
            artifacts,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Creation bytecode followed by the ABI-encoded constructor arguments.
    pub fn initcode(&self, request: &DeployRequest) -> Result<Vec<u8>> {
        let mut initcode = self.artifacts.bytecode(&request.contract)?.to_vec();

        if request.args.is_empty() {
            return Ok(initcode);
        }

        let constructor = self
            .artifacts
            .abi(&request.contract)?
            .constructor()
            .with_context(|| {
                format!(
                    "{} has no constructor but {} arguments were given",
                    request.contract,
                    request.args.len()
                )
            })?;

        let encoded = constructor
            .abi_encode_input(&request.args)
            .with_context(|| format!("Failed to encode constructor arguments of {}", request.contract))?;
        initcode.extend_from_slice(&encoded);
        Ok(initcode)
    }

    /// Selector and ABI-encoded arguments of the call.
    ///
    /// Overloads are told apart by the number of arguments.
    pub fn calldata(&self, request: &ExecuteRequest) -> Result<Vec<u8>> {
        let abi = self.artifacts.abi(&request.abi)?;
        let function = abi
            .function(&request.function)
            .and_then(|overloads| {
                overloads
                    .iter()
                    .find(|function| function.inputs.len() == request.args.len())
            })
            .with_context(|| {
                format!(
                    "{} has no function {} taking {} arguments",
                    request.abi,
                    request.function,
                    request.args.len()
                )
            })?;

        function
            .abi_encode_input(&request.args)
            .with_context(|| format!("Failed to encode arguments of {}", function.signature()))
    }

    async fn sender(&self, overrides: &ExecutionOverrides) -> Result<Address> {
        if let Some(from) = overrides.from {
            return Ok(from);
        }

        let accounts: Vec<Address> =
            json_rpc_call(&self.client, &self.url, "eth_accounts", vec![]).await?;
        accounts
            .first()
            .copied()
            .context("Node has no unlocked account and no sender was configured")
    }

    async fn has_code(&self, address: Address) -> Result<bool> {
        let code: Bytes = json_rpc_call(
            &self.client,
            &self.url,
            "eth_getCode",
            vec![serde_json::json!(address), serde_json::json!("latest")],
        )
        .await?;
        Ok(!code.is_empty())
    }

    /// Send a transaction and wait for its successful receipt.
    async fn transact(
        &self,
        to: Option<Address>,
        input: Bytes,
        overrides: &ExecutionOverrides,
    ) -> Result<RpcReceipt> {
        let transaction = TransactionRequest {
            from: self.sender(overrides).await?,
            to,
            input,
            gas: overrides.gas.map(U64::from),
            gas_price: overrides.gas_price.map(U64::from),
            nonce: overrides.nonce.map(U64::from),
            value: overrides.value,
        };

        let hash: B256 = json_rpc_call(
            &self.client,
            &self.url,
            "eth_sendTransaction",
            vec![serde_json::to_value(&transaction).context("Failed to serialize transaction")?],
        )
        .await?;
        tracing::debug!(tx_hash = %hash, "Transaction submitted");

        let receipt: RpcReceipt = poll_until(
            &format!("receipt of {hash}"),
            self.confirmation_timeout,
            self.poll_interval,
            || {
                json_rpc_call::<Option<RpcReceipt>>(
                    &self.client,
                    &self.url,
                    "eth_getTransactionReceipt",
                    vec![serde_json::json!(hash)],
                )
            },
        )
        .await?;

        receipt.ensure_success()?;
        Ok(receipt)
    }
}

impl StepExecutor for RpcExecutor {
    async fn deploy(&self, request: DeployRequest) -> Result<Deployment> {
        let initcode = self.initcode(&request)?;

        let Some(salt) = request.salt else {
            let receipt = self.transact(None, initcode.into(), &request.overrides).await?;
            let address = receipt
                .contract_address
                .context("Receipt of a contract creation has no contract address")?;
            tracing::info!(id = %request.id, contract = %request.contract, %address, "Contract deployed");
            return Ok(Deployment {
                address,
                receipt: receipt.into(),
            });
        };

        let address = DETERMINISTIC_DEPLOYER.create2_from_code(salt.0, &initcode);

        // Same salt and initcode always lands on the same address.
        if self.has_code(address).await? {
            tracing::info!(id = %request.id, contract = %request.contract, %address, "Deterministic contract already deployed");
            return Ok(Deployment {
                address,
                receipt: Receipt::default(),
            });
        }

        let mut input = salt.to_vec();
        input.extend_from_slice(&initcode);
        let receipt = self
            .transact(Some(DETERMINISTIC_DEPLOYER), input.into(), &request.overrides)
            .await?;

        if !self.has_code(address).await? {
            anyhow::bail!("No code at {address} after deterministic deployment");
        }

        tracing::info!(id = %request.id, contract = %request.contract, %address, "Contract deployed deterministically");
        Ok(Deployment {
            address,
            receipt: receipt.into(),
        })
    }

    async fn execute(&self, request: ExecuteRequest) -> Result<Receipt> {
        let calldata = self.calldata(&request)?;
        let receipt = self
            .transact(Some(request.to), calldata.into(), &request.overrides)
            .await?;
        tracing::info!(
            id = %request.id,
            to = %request.to,
            function = %request.function,
            tx_hash = %receipt.transaction_hash,
            "Call executed"
        );
        Ok(receipt.into())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionRequest {
    from: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<Address>,
    input: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    gas: Option<U64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gas_price: Option<U64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<U64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<U256>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    #[serde(default)]
    status: Option<U64>,
    #[serde(default)]
    contract_address: Option<Address>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

#[derive(Debug, Clone, Deserialize)]
struct RpcLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
}

impl RpcReceipt {
    fn ensure_success(&self) -> Result<()> {
        if self.status == Some(U64::ZERO) {
            anyhow::bail!("Transaction {} reverted", self.transaction_hash);
        }
        Ok(())
    }
}

impl From<RpcReceipt> for Receipt {
    fn from(receipt: RpcReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            logs: receipt
                .logs
                .into_iter()
                .map(|log| Log::new_unchecked(log.address, log.topics, log.data))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogicalId;
    use alloy_core::{dyn_abi::DynSolValue, primitives::keccak256};

    const COUNTER_ARTIFACT: &str = r#"{
        "abi": [
            {"type": "function", "name": "setNumber", "inputs": [{"name": "newNumber", "type": "uint256", "internalType": "uint256"}], "outputs": [], "stateMutability": "nonpayable"},
            {"type": "function", "name": "increment", "inputs": [], "outputs": [], "stateMutability": "nonpayable"}
        ],
        "bytecode": {"object": "0x6080604052"}
    }"#;

    const PROXY_ARTIFACT: &str = r#"{
        "abi": [
            {"type": "constructor", "inputs": [{"name": "counter", "type": "address", "internalType": "contract Counter"}], "stateMutability": "nonpayable"}
        ],
        "bytecode": {"object": "0x60aa"}
    }"#;

    fn executor() -> RpcExecutor {
        let mut artifacts = ArtifactStore::new();
        artifacts.insert(
            "Counter",
            ArtifactStore::parse_artifact(COUNTER_ARTIFACT).expect("Failed to parse"),
        );
        artifacts.insert(
            "ProxyCounter",
            ArtifactStore::parse_artifact(PROXY_ARTIFACT).expect("Failed to parse"),
        );
        let url = Url::parse("http://127.0.0.1:8545").expect("Failed to parse url");
        RpcExecutor::new(url, Arc::new(artifacts)).expect("Failed to create executor")
    }

    fn deploy_request(contract: &str, args: Vec<DynSolValue>) -> DeployRequest {
        DeployRequest {
            id: LogicalId::from(contract),
            contract: contract.to_string(),
            args,
            salt: None,
            overrides: ExecutionOverrides::default(),
        }
    }

    #[test]
    fn test_initcode_without_args_is_bytecode() {
        let initcode = executor()
            .initcode(&deploy_request("Counter", vec![]))
            .expect("Failed to build initcode");
        assert_eq!(initcode, vec![0x60, 0x80, 0x60, 0x40, 0x52]);
    }

    #[test]
    fn test_initcode_appends_constructor_args() {
        let counter = address!("0x5FbDB2315678afecb367f032d93F642f64180aa3");
        let initcode = executor()
            .initcode(&deploy_request(
                "ProxyCounter",
                vec![DynSolValue::Address(counter)],
            ))
            .expect("Failed to build initcode");

        assert_eq!(initcode.len(), 2 + 32);
        assert_eq!(&initcode[..2], &[0x60, 0xaa]);
        assert_eq!(&initcode[2 + 12..], counter.as_slice());
    }

    #[test]
    fn test_initcode_rejects_args_without_constructor() {
        let result = executor().initcode(&deploy_request(
            "Counter",
            vec![DynSolValue::Uint(U256::from(1), 256)],
        ));
        assert!(result.is_err());
    }

    #[test]
    fn test_calldata_picks_overload_by_arity() {
        let request = ExecuteRequest {
            id: LogicalId::from("InitialCounterNumber"),
            abi: "Counter".to_string(),
            to: Address::ZERO,
            function: "setNumber".to_string(),
            args: vec![DynSolValue::Uint(U256::from(7), 256)],
            overrides: ExecutionOverrides::default(),
        };

        let calldata = executor().calldata(&request).expect("Failed to encode call");
        assert_eq!(&calldata[..4], &keccak256("setNumber(uint256)")[..4]);
        assert_eq!(calldata.len(), 4 + 32);
        assert_eq!(calldata[35], 7);
    }

    #[test]
    fn test_calldata_unknown_function() {
        let request = ExecuteRequest {
            id: LogicalId::from("Missing"),
            abi: "Counter".to_string(),
            to: Address::ZERO,
            function: "decrement".to_string(),
            args: vec![],
            overrides: ExecutionOverrides::default(),
        };
        assert!(executor().calldata(&request).is_err());
    }

    #[test]
    fn test_receipt_conversion_keeps_log_order() {
        let receipt: RpcReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
            "status": "0x1",
            "contractAddress": null,
            "logs": [
                {"address": "0x5fbdb2315678afecb367f032d93f642f64180aa3", "topics": [], "data": "0x01", "logIndex": "0x0"},
                {"address": "0xe7f1725e7734ce288f8367e1bb143e90bb3f0512", "topics": [], "data": "0x02", "logIndex": "0x1"}
            ]
        }))
        .expect("Failed to parse receipt");

        assert!(receipt.ensure_success().is_ok());
        let receipt: Receipt = receipt.into();
        assert_eq!(receipt.logs.len(), 2);
        assert_eq!(
            receipt.logs[0].address,
            address!("0x5FbDB2315678afecb367f032d93F642f64180aa3")
        );
        assert_eq!(receipt.logs[1].data.data, Bytes::from_static(&[0x02]));
    }

    #[test]
    fn test_reverted_receipt_is_error() {
        let receipt: RpcReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0x2222222222222222222222222222222222222222222222222222222222222222",
            "status": "0x0",
            "logs": []
        }))
        .expect("Failed to parse receipt");

        let err = receipt.ensure_success().expect_err("Reverted receipt must fail");
        assert!(err.to_string().contains("reverted"));
    }

    #[test]
    fn test_transaction_request_uses_hex_quantities() {
        let transaction = TransactionRequest {
            from: Address::ZERO,
            to: None,
            input: Bytes::from_static(&[0x60]),
            gas: Some(U64::from(300_000u64)),
            gas_price: None,
            nonce: None,
            value: None,
        };
        let json = serde_json::to_value(&transaction).expect("Failed to serialize");

        assert_eq!(json["gas"], "0x493e0");
        assert_eq!(json["input"], "0x60");
        assert!(json.get("to").is_none());
        assert!(json.get("gasPrice").is_none());
    }
}
