use std::time::Duration;

use keon_proto::{EncodeError, ProtocolError, Stage};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum BleError {
    #[error("no Bluetooth adapter found")]
    NoAdapter,
    #[error("no Keon device found")]
    DeviceNotFound,
    #[error("the device should be connected first")]
    NotConnected,
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error("characteristic {0} returned an empty value")]
    EmptyValue(Uuid),
    #[error("bluetooth error: {0}")]
    Btleplug(#[from] btleplug::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("connection lost at stage {stage}: {source}")]
    ConnectionLost {
        stage: Stage,
        #[source]
        source: BleError,
    },
    #[error("stage {stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },
    #[error("device returned an empty status at stage {stage}")]
    EmptyStatus { stage: Stage },
    #[error(transparent)]
    Ble(#[from] BleError),
}

impl ProvisionError {
    /// Stage the handshake stopped at, when it got that far
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ProvisionError::Protocol(e) => e.stage(),
            ProvisionError::ConnectionLost { stage, .. }
            | ProvisionError::Timeout { stage, .. }
            | ProvisionError::EmptyStatus { stage } => Some(*stage),
            _ => None,
        }
    }
}
