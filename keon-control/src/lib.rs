//! Keon Control - the real-time command and telemetry channel
//!
//! Messages are modelled as one enum variant per socket event, each with a
//! typed payload. The socket itself sits behind [`ControlChannel`].

mod manager;
mod message;

pub use manager::{
    ControlChannel, ControlError, DEFAULT_COMMAND_INTERVAL, KEON_MAX_POS, KEON_MIN_POS, KeonManager,
};
pub use message::{
    DeviceCommand, DeviceSetting, DeviceStatus, InboundEvent, OutboundEvent, ReprovisionCommand,
};
