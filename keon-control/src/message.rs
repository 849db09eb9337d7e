//! Socket events and their payloads

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::warn;

/// Payload of `send_command_to_devices`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command_type", content = "arguments", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceCommand {
    Movement { speed: u8, position: u8 },
    MovementBetween { speed: u8, min_position: u8, max_position: u8 },
    Pause {},
}

/// Payload of `send_settings_to_device`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "setup_type", content = "arguments", rename_all = "snake_case")]
pub enum DeviceSetting {
    SpeedIntensityAdjustment { intensity: u32 },
    RangeIntensityAdjustment { intensity: u32 },
    StatusUpdateInterval { interval: u32 },
}

/// Payload of `send_reprovision_command_to_device`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reprovision_type", content = "arguments", rename_all = "snake_case")]
pub enum ReprovisionCommand {
    BtMode {},
    ResetCredentials {},
}

/// Events the client emits
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    SendCommandToDevices(DeviceCommand),
    SendSettingsToDevice(DeviceSetting),
    GetStatusOfDevices,
    SendReprovisionCommandToDevice(ReprovisionCommand),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::SendCommandToDevices(_) => "send_command_to_devices",
            OutboundEvent::SendSettingsToDevice(_) => "send_settings_to_device",
            OutboundEvent::GetStatusOfDevices => "get_status_of_devices",
            OutboundEvent::SendReprovisionCommandToDevice(_) => {
                "send_reprovision_command_to_device"
            }
        }
    }

    pub fn payload(&self) -> Result<JsonValue, serde_json::Error> {
        match self {
            OutboundEvent::SendCommandToDevices(cmd) => serde_json::to_value(cmd),
            OutboundEvent::SendSettingsToDevice(setting) => serde_json::to_value(setting),
            OutboundEvent::GetStatusOfDevices => Ok(json!({})),
            OutboundEvent::SendReprovisionCommandToDevice(cmd) => serde_json::to_value(cmd),
        }
    }
}

/// Telemetry record a Keon reports in `device_status`.
///
/// Every field is optional: a missing, `null` or mistyped value leaves that
/// field empty without discarding the rest of the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    #[serde(default, deserialize_with = "lenient")]
    pub ble_address: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub serial_number: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub battery_status: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub status_package: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub encoder_pos: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub motor_speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub wifi_strength: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub intensity: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub stroker_level: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub firmware_version: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub status_period: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub error_code: Option<f64>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Events the server pushes
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// `device_status`; `None` when the payload carries no Keon record
    DeviceStatus(Option<DeviceStatus>),
    /// `user_activity_on_device`
    UserActivity(JsonValue),
    /// `message`
    Message(JsonValue),
    Disconnected(String),
}

impl InboundEvent {
    /// Interpret a raw socket event; unknown event names yield `None`
    pub fn parse(event: &str, data: JsonValue) -> Option<Self> {
        match event {
            "device_status" => {
                let record = data
                    .get("payload")
                    .and_then(|p| p.get("KEON"))
                    .filter(|k| k.is_object());
                let status = record.and_then(|k| match serde_json::from_value(k.clone()) {
                    Ok(status) => Some(status),
                    Err(e) => {
                        warn!("cannot decode KEON status record: {e}");
                        None
                    }
                });
                Some(InboundEvent::DeviceStatus(status))
            }
            "user_activity_on_device" => Some(InboundEvent::UserActivity(data)),
            "message" => Some(InboundEvent::Message(data)),
            "disconnect" => Some(InboundEvent::Disconnected(
                data.as_str().unwrap_or_default().to_string(),
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wire_shapes() {
        let movement = OutboundEvent::SendCommandToDevices(DeviceCommand::Movement {
            speed: 50,
            position: 90,
        });
        assert_eq!(movement.name(), "send_command_to_devices");
        assert_eq!(
            movement.payload().unwrap(),
            json!({ "command_type": "MOVEMENT", "arguments": { "speed": 50, "position": 90 } })
        );

        let between = DeviceCommand::MovementBetween {
            speed: 10,
            min_position: 0,
            max_position: 45,
        };
        assert_eq!(
            serde_json::to_value(&between).unwrap(),
            json!({
                "command_type": "MOVEMENT_BETWEEN",
                "arguments": { "speed": 10, "min_position": 0, "max_position": 45 }
            })
        );

        assert_eq!(
            serde_json::to_value(DeviceCommand::Pause {}).unwrap(),
            json!({ "command_type": "PAUSE", "arguments": {} })
        );
    }

    #[test]
    fn setting_and_reprovision_wire_shapes() {
        assert_eq!(
            serde_json::to_value(DeviceSetting::StatusUpdateInterval { interval: 5 }).unwrap(),
            json!({ "setup_type": "status_update_interval", "arguments": { "interval": 5 } })
        );
        assert_eq!(
            serde_json::to_value(DeviceSetting::SpeedIntensityAdjustment { intensity: 4 }).unwrap(),
            json!({ "setup_type": "speed_intensity_adjustment", "arguments": { "intensity": 4 } })
        );
        let reset = OutboundEvent::SendReprovisionCommandToDevice(ReprovisionCommand::ResetCredentials {});
        assert_eq!(reset.name(), "send_reprovision_command_to_device");
        assert_eq!(
            reset.payload().unwrap(),
            json!({ "reprovision_type": "reset_credentials", "arguments": {} })
        );
        assert_eq!(OutboundEvent::GetStatusOfDevices.payload().unwrap(), json!({}));
    }

    #[test]
    fn parses_device_status() {
        let data = json!({
            "payload": {
                "KEON": {
                    "ble_address": "aa:bb",
                    "serial_number": "SN1",
                    "battery_status": 80,
                    "encoder_pos": 45,
                    "motor_speed": 3,
                    "wifi_strength": -60,
                    "error_code": 0
                }
            }
        });
        let Some(InboundEvent::DeviceStatus(Some(status))) = InboundEvent::parse("device_status", data)
        else {
            panic!("expected a device status");
        };
        assert_eq!(status.serial_number.as_deref(), Some("SN1"));
        assert_eq!(status.battery_status, Some(80.0));
        assert_eq!(status.wifi_strength, Some(-60.0));
        assert_eq!(status.firmware_version, None);
    }

    #[test]
    fn null_and_mistyped_fields_keep_the_record() {
        let data = json!({
            "payload": {
                "KEON": {
                    "serial_number": "SN1",
                    "battery_status": 80,
                    "error_code": null,
                    "encoder_pos": 12.5,
                    "motor_speed": "fast"
                }
            }
        });
        let Some(InboundEvent::DeviceStatus(Some(status))) = InboundEvent::parse("device_status", data)
        else {
            panic!("expected a device status");
        };
        assert_eq!(status.serial_number.as_deref(), Some("SN1"));
        assert_eq!(status.battery_status, Some(80.0));
        assert_eq!(status.error_code, None);
        assert_eq!(status.encoder_pos, Some(12.5));
        assert_eq!(status.motor_speed, None);
    }

    #[test]
    fn device_status_without_keon_record() {
        assert_eq!(
            InboundEvent::parse("device_status", json!({ "payload": {} })),
            Some(InboundEvent::DeviceStatus(None))
        );
        assert_eq!(
            InboundEvent::parse("device_status", json!("oops")),
            Some(InboundEvent::DeviceStatus(None))
        );
        assert_eq!(InboundEvent::parse("something_else", json!({})), None);
    }
}
