//! Extraction of decoded events from receipt logs.

use alloy_core::{
    dyn_abi::{DynSolValue, EventExt},
    json_abi::{Event, JsonAbi},
    primitives::{Address, B256, Log},
};

use crate::DeployError;

/// One decoded occurrence of a named event.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    /// Event name as declared in the ABI.
    pub name: String,
    /// Contract that emitted the log.
    pub address: Address,
    /// Position of the originating log in the receipt.
    pub log_index: usize,
    /// Parameters in declaration order, indexed and non-indexed interleaved as declared.
    pub params: Vec<(String, DynSolValue)>,
}

impl DecodedEvent {
    pub fn get(&self, param: &str) -> Option<&DynSolValue> {
        self.params
            .iter()
            .find(|(name, _)| name == param)
            .map(|(_, value)| value)
    }

    /// Read an `address` parameter.
    pub fn address_param(&self, param: &str) -> Result<Address, DeployError> {
        match self.get(param) {
            Some(value) => value
                .as_address()
                .ok_or_else(|| self.shape_error(format!("parameter {param} is not an address"))),
            None => Err(self.shape_error(format!("missing parameter {param}"))),
        }
    }

    /// Read a `bytes32` parameter.
    pub fn word_param(&self, param: &str) -> Result<B256, DeployError> {
        match self.get(param) {
            Some(DynSolValue::FixedBytes(word, 32)) => Ok(*word),
            Some(_) => Err(self.shape_error(format!("parameter {param} is not a bytes32"))),
            None => Err(self.shape_error(format!("missing parameter {param}"))),
        }
    }

    fn shape_error(&self, reason: String) -> DeployError {
        DeployError::UnknownEventShape {
            event: self.name.clone(),
            reason,
        }
    }
}

/// Decode every log matching `event_name` (and the emitter `address`, when given).
///
/// Results keep the order of `logs`, i.e. transaction execution order. Logs that match
/// the event signature but cannot be decoded are skipped. An event name that `abi` does
/// not declare is a configuration error since nothing could ever match it.
pub fn extract_events(
    abi: &JsonAbi,
    address: Option<Address>,
    event_name: &str,
    logs: &[Log],
) -> Result<Vec<DecodedEvent>, DeployError> {
    let overloads = abi
        .event(event_name)
        .ok_or_else(|| DeployError::config(format!("ABI does not declare event {event_name}")))?;

    let mut decoded = Vec::new();
    for (log_index, log) in logs.iter().enumerate() {
        if address.is_some_and(|address| address != log.address) {
            continue;
        }

        let Some(topic0) = log.data.topics().first() else {
            continue;
        };

        let Some(event) = overloads
            .iter()
            .find(|event| !event.anonymous && event.selector() == *topic0)
        else {
            continue;
        };

        match decode_log(event, log, log_index) {
            Ok(event) => decoded.push(event),
            Err(err) => {
                tracing::debug!(
                    event = event_name,
                    log_index,
                    emitter = %log.address,
                    error = %err,
                    "Skipping undecodable log"
                );
            }
        }
    }

    Ok(decoded)
}

fn decode_log(event: &Event, log: &Log, log_index: usize) -> alloy_core::dyn_abi::Result<DecodedEvent> {
    let raw = event.decode_log(&log.data)?;

    let mut indexed = raw.indexed.into_iter();
    let mut body = raw.body.into_iter();
    let params = event
        .inputs
        .iter()
        .filter_map(|input| {
            let value = if input.indexed {
                indexed.next()
            } else {
                body.next()
            };
            value.map(|value| (input.name.clone(), value))
        })
        .collect();

    Ok(DecodedEvent {
        name: event.name.clone(),
        address: log.address,
        log_index,
        params,
    })
}

/// A statically known event layout.
pub trait EventShape: Sized {
    /// Event name as declared in the ABI.
    const NAME: &'static str;

    /// Read the typed shape out of a decoded event.
    fn decode(event: &DecodedEvent) -> Result<Self, DeployError>;
}

fn ensure_name<T: EventShape>(event: &DecodedEvent) -> Result<(), DeployError> {
    if event.name == T::NAME {
        Ok(())
    } else {
        Err(DeployError::UnknownEventShape {
            event: event.name.clone(),
            reason: format!("expected {}", T::NAME),
        })
    }
}

/// `DepartmentFactory.DepartmentOwnerCreated(address departmentOwner)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepartmentOwnerCreated {
    pub department_owner: Address,
}

impl EventShape for DepartmentOwnerCreated {
    const NAME: &'static str = "DepartmentOwnerCreated";

    fn decode(event: &DecodedEvent) -> Result<Self, DeployError> {
        ensure_name::<Self>(event)?;
        Ok(Self {
            department_owner: event.address_param("departmentOwner")?,
        })
    }
}

/// `DepartmentFactory.DepartmentCreated(address department, bytes32 tag)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepartmentCreated {
    pub department: Address,
    pub tag: B256,
}

impl EventShape for DepartmentCreated {
    const NAME: &'static str = "DepartmentCreated";

    fn decode(event: &DecodedEvent) -> Result<Self, DeployError> {
        ensure_name::<Self>(event)?;
        Ok(Self {
            department: event.address_param("department")?,
            tag: event.word_param("tag")?,
        })
    }
}

/// `PluginSetupProcessor.InstallationPrepared(..., address indexed dao, ..., address plugin, ...)`.
///
/// Only the fields the deployment needs are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallationPrepared {
    pub dao: Address,
    pub plugin: Address,
}

impl EventShape for InstallationPrepared {
    const NAME: &'static str = "InstallationPrepared";

    fn decode(event: &DecodedEvent) -> Result<Self, DeployError> {
        ensure_name::<Self>(event)?;
        Ok(Self {
            dao: event.address_param("dao")?,
            plugin: event.address_param("plugin")?,
        })
    }
}

/// `SmartAccountDepartmentInstaller.DepartmentInstalled(address indexed department, bytes32 indexed tag)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepartmentInstalled {
    pub department: Address,
    pub tag: B256,
}

impl EventShape for DepartmentInstalled {
    const NAME: &'static str = "DepartmentInstalled";

    fn decode(event: &DecodedEvent) -> Result<Self, DeployError> {
        ensure_name::<Self>(event)?;
        Ok(Self {
            department: event.address_param("department")?,
            tag: event.word_param("tag")?,
        })
    }
}

/// Every event shape the procedures know about, keyed by event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownEvent {
    DepartmentOwnerCreated(DepartmentOwnerCreated),
    DepartmentCreated(DepartmentCreated),
    InstallationPrepared(InstallationPrepared),
    DepartmentInstalled(DepartmentInstalled),
}

impl TryFrom<&DecodedEvent> for KnownEvent {
    type Error = DeployError;

    fn try_from(event: &DecodedEvent) -> Result<Self, Self::Error> {
        match event.name.as_str() {
            DepartmentOwnerCreated::NAME => {
                DepartmentOwnerCreated::decode(event).map(Self::DepartmentOwnerCreated)
            }
            DepartmentCreated::NAME => DepartmentCreated::decode(event).map(Self::DepartmentCreated),
            InstallationPrepared::NAME => {
                InstallationPrepared::decode(event).map(Self::InstallationPrepared)
            }
            DepartmentInstalled::NAME => {
                DepartmentInstalled::decode(event).map(Self::DepartmentInstalled)
            }
            other => Err(DeployError::UnknownEventShape {
                event: other.to_string(),
                reason: "no known shape".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::{LogData, address, b256};

    const FACTORY_ABI: &str = r#"[
        {"type": "event", "name": "DepartmentCreated", "inputs": [
            {"name": "department", "type": "address", "indexed": false, "internalType": "contract IDAO"},
            {"name": "tag", "type": "bytes32", "indexed": false, "internalType": "bytes32"}
        ], "anonymous": false},
        {"type": "event", "name": "DepartmentOwnerCreated", "inputs": [
            {"name": "departmentOwner", "type": "address", "indexed": false, "internalType": "contract IDAO"}
        ], "anonymous": false},
        {"type": "event", "name": "DepartmentInstalled", "inputs": [
            {"name": "department", "type": "address", "indexed": true, "internalType": "address"},
            {"name": "tag", "type": "bytes32", "indexed": true, "internalType": "bytes32"}
        ], "anonymous": false}
    ]"#;

    const FACTORY: Address = address!("0x904e76EFA903cb705Bb1583e16a6e73EF69EAde9");
    const DAO: Address = address!("0x5aC5C9eF579f70D307121a2Cf34Bf16807158A0e");
    const TAG: B256 = b256!("0x07208e7ecf628e1095711165b8ef16d18539fa71b914042fec53d63c160c216c");

    fn abi() -> JsonAbi {
        serde_json::from_str(FACTORY_ABI).expect("Failed to parse ABI")
    }

    fn selector(abi: &JsonAbi, name: &str) -> B256 {
        abi.event(name).expect("event")[0].selector()
    }

    fn department_created(abi: &JsonAbi, emitter: Address, department: Address) -> Log {
        let data = DynSolValue::Tuple(vec![
            DynSolValue::Address(department),
            DynSolValue::FixedBytes(TAG, 32),
        ])
        .abi_encode_params();
        Log {
            address: emitter,
            data: LogData::new_unchecked(vec![selector(abi, "DepartmentCreated")], data.into()),
        }
    }

    fn owner_created(abi: &JsonAbi, emitter: Address, owner: Address) -> Log {
        let data = DynSolValue::Tuple(vec![DynSolValue::Address(owner)]).abi_encode_params();
        Log {
            address: emitter,
            data: LogData::new_unchecked(
                vec![selector(abi, "DepartmentOwnerCreated")],
                data.into(),
            ),
        }
    }

    #[test]
    fn test_extract_keeps_only_matching_log() {
        let abi = abi();
        let logs = vec![
            owner_created(&abi, FACTORY, DAO),
            department_created(&abi, FACTORY, DAO),
            owner_created(&abi, FACTORY, Address::ZERO),
        ];

        let events = extract_events(&abi, Some(FACTORY), "DepartmentCreated", &logs)
            .expect("Failed to extract events");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].log_index, 1);
        assert_eq!(events[0].address_param("department").expect("department"), DAO);
        assert_eq!(events[0].word_param("tag").expect("tag"), TAG);
    }

    #[test]
    fn test_extract_preserves_log_order() {
        let abi = abi();
        let first = address!("0x0000000000000000000000000000000000000001");
        let second = address!("0x0000000000000000000000000000000000000002");
        let logs = vec![
            department_created(&abi, FACTORY, first),
            department_created(&abi, FACTORY, second),
        ];

        let events =
            extract_events(&abi, None, "DepartmentCreated", &logs).expect("Failed to extract");
        let departments: Vec<_> = events
            .iter()
            .map(|event| event.address_param("department").expect("department"))
            .collect();
        assert_eq!(departments, vec![first, second]);
    }

    #[test]
    fn test_extract_filters_by_emitter() {
        let abi = abi();
        let logs = vec![department_created(&abi, DAO, DAO)];

        let filtered = extract_events(&abi, Some(FACTORY), "DepartmentCreated", &logs)
            .expect("Failed to extract");
        assert!(filtered.is_empty(), "Logs from other emitters must be ignored");

        let unfiltered =
            extract_events(&abi, None, "DepartmentCreated", &logs).expect("Failed to extract");
        assert_eq!(unfiltered.len(), 1);
    }

    #[test]
    fn test_extract_skips_malformed_data() {
        let abi = abi();
        let malformed = Log {
            address: FACTORY,
            data: LogData::new_unchecked(
                vec![selector(&abi, "DepartmentCreated")],
                vec![0u8; 7].into(),
            ),
        };
        let logs = vec![malformed, department_created(&abi, FACTORY, DAO)];

        let events = extract_events(&abi, Some(FACTORY), "DepartmentCreated", &logs)
            .expect("Malformed logs must not be fatal");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].log_index, 1);
    }

    #[test]
    fn test_extract_decodes_indexed_params() {
        let abi = abi();
        let log = Log {
            address: FACTORY,
            data: LogData::new_unchecked(
                vec![selector(&abi, "DepartmentInstalled"), DAO.into_word(), TAG],
                Default::default(),
            ),
        };

        let events =
            extract_events(&abi, None, "DepartmentInstalled", &[log]).expect("Failed to extract");
        let installed = DepartmentInstalled::decode(&events[0]).expect("Failed to decode shape");
        assert_eq!(installed.department, DAO);
        assert_eq!(installed.tag, TAG);
    }

    #[test]
    fn test_unknown_event_name_is_configuration_error() {
        let result = extract_events(&abi(), None, "NotDeclared", &[]);
        assert!(matches!(result, Err(DeployError::Configuration(_))));
    }

    #[test]
    fn test_known_event_dispatch() {
        let abi = abi();
        let logs = vec![owner_created(&abi, FACTORY, DAO)];
        let events =
            extract_events(&abi, None, "DepartmentOwnerCreated", &logs).expect("extract");

        let known = KnownEvent::try_from(&events[0]).expect("known shape");
        assert_eq!(
            known,
            KnownEvent::DepartmentOwnerCreated(DepartmentOwnerCreated {
                department_owner: DAO
            })
        );
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        let abi = abi();
        let logs = vec![owner_created(&abi, FACTORY, DAO)];
        let events =
            extract_events(&abi, None, "DepartmentOwnerCreated", &logs).expect("extract");

        let result = DepartmentCreated::decode(&events[0]);
        assert!(matches!(result, Err(DeployError::UnknownEventShape { .. })));

        let unknown = DecodedEvent {
            name: "Transfer".to_string(),
            address: FACTORY,
            log_index: 0,
            params: Vec::new(),
        };
        assert!(matches!(
            KnownEvent::try_from(&unknown),
            Err(DeployError::UnknownEventShape { .. })
        ));
    }
}
