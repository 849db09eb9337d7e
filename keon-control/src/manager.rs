use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::message::{
    DeviceCommand, DeviceSetting, DeviceStatus, InboundEvent, OutboundEvent, ReprovisionCommand,
};

pub const KEON_MIN_POS: u8 = 0;
pub const KEON_MAX_POS: u8 = 90;

/// Pause between the two halves of an intensity adjustment
pub const DEFAULT_COMMAND_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("control channel is not connected")]
    NotConnected,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("control channel error: {0}")]
    Channel(String),
    #[error("cannot encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// An open socket to the control server
#[async_trait::async_trait]
pub trait ControlChannel: Send {
    async fn emit(&mut self, event: &str, payload: JsonValue) -> Result<(), ControlError>;

    async fn close(&mut self) -> Result<(), ControlError>;
}

type UserActivityHandler = Box<dyn Fn(JsonValue) + Send + Sync>;

/// Sends device commands over a [`ControlChannel`] and keeps the last
/// status report the device pushed
pub struct KeonManager<C> {
    channel: Option<C>,
    device_status: Option<DeviceStatus>,
    on_user_activity: UserActivityHandler,
}

impl<C: ControlChannel> KeonManager<C> {
    pub fn new(on_user_activity: impl Fn(JsonValue) + Send + Sync + 'static) -> Self {
        Self {
            channel: None,
            device_status: None,
            on_user_activity: Box::new(on_user_activity),
        }
    }

    /// Attach an opened channel; replaces (and closes) any previous one
    pub async fn init(&mut self, channel: C) -> Result<(), ControlError> {
        if let Some(mut previous) = self.channel.replace(channel) {
            previous.close().await?;
        }
        info!("control channel attached");
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), ControlError> {
        match self.channel.take() {
            Some(mut channel) => {
                info!("closing control channel");
                channel.close().await
            }
            None => Ok(()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn device_status(&self) -> Option<&DeviceStatus> {
        self.device_status.as_ref()
    }

    async fn send(&mut self, event: OutboundEvent) -> Result<(), ControlError> {
        let channel = self.channel.as_mut().ok_or(ControlError::NotConnected)?;
        let payload = event.payload()?;
        debug!(event = event.name(), %payload, "emit");
        channel.emit(event.name(), payload).await
    }

    pub async fn move_to(&mut self, speed: u8, position: u8) -> Result<(), ControlError> {
        check_position("position", position)?;
        self.send(OutboundEvent::SendCommandToDevices(DeviceCommand::Movement {
            speed,
            position,
        }))
        .await
    }

    pub async fn movement_between(
        &mut self,
        speed: u8,
        min_position: u8,
        max_position: u8,
    ) -> Result<(), ControlError> {
        check_position("min_position", min_position)?;
        check_position("max_position", max_position)?;
        self.send(OutboundEvent::SendCommandToDevices(
            DeviceCommand::MovementBetween {
                speed,
                min_position,
                max_position,
            },
        ))
        .await
    }

    pub async fn stop(&mut self) -> Result<(), ControlError> {
        self.send(OutboundEvent::SendCommandToDevices(DeviceCommand::Pause {}))
            .await
    }

    /// Ask the device for an immediate `device_status`
    pub async fn force_status_report(&mut self) -> Result<(), ControlError> {
        self.send(OutboundEvent::GetStatusOfDevices).await
    }

    /// Speed adjustment at twice `intensity`, then range adjustment at
    /// `intensity`, [`DEFAULT_COMMAND_INTERVAL`] apart
    pub async fn set_intensity_adjustment(&mut self, intensity: u32) -> Result<(), ControlError> {
        let doubled = intensity
            .checked_mul(2)
            .ok_or_else(|| ControlError::InvalidArgument(format!("intensity {intensity}")))?;
        self.send(OutboundEvent::SendSettingsToDevice(
            DeviceSetting::SpeedIntensityAdjustment { intensity: doubled },
        ))
        .await?;
        tokio::time::sleep(DEFAULT_COMMAND_INTERVAL).await;
        self.send(OutboundEvent::SendSettingsToDevice(
            DeviceSetting::RangeIntensityAdjustment { intensity },
        ))
        .await
    }

    pub async fn set_status_update_interval(&mut self, interval: u32) -> Result<(), ControlError> {
        self.send(OutboundEvent::SendSettingsToDevice(
            DeviceSetting::StatusUpdateInterval { interval },
        ))
        .await
    }

    pub async fn switch_to_bt_mode(&mut self) -> Result<(), ControlError> {
        self.send(OutboundEvent::SendReprovisionCommandToDevice(
            ReprovisionCommand::BtMode {},
        ))
        .await
    }

    pub async fn reset_credentials(&mut self) -> Result<(), ControlError> {
        self.send(OutboundEvent::SendReprovisionCommandToDevice(
            ReprovisionCommand::ResetCredentials {},
        ))
        .await
    }

    /// Feed a raw event received from the socket
    pub fn handle_inbound(&mut self, event: &str, data: JsonValue) {
        match InboundEvent::parse(event, data) {
            Some(InboundEvent::DeviceStatus(status)) => {
                if status.is_none() {
                    debug!("device_status without a KEON record");
                }
                self.device_status = status;
            }
            Some(InboundEvent::UserActivity(activity)) => (self.on_user_activity)(activity),
            Some(InboundEvent::Message(message)) => info!(%message, "server message"),
            Some(InboundEvent::Disconnected(reason)) => {
                warn!(%reason, "control channel disconnected by server");
                self.channel = None;
            }
            None => debug!(event, "ignoring unknown event"),
        }
    }
}

fn check_position(name: &str, position: u8) -> Result<(), ControlError> {
    if (KEON_MIN_POS..=KEON_MAX_POS).contains(&position) {
        Ok(())
    } else {
        Err(ControlError::InvalidArgument(format!(
            "{name} {position} outside {KEON_MIN_POS}..={KEON_MAX_POS}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;

    type Sent = Arc<Mutex<Vec<(String, JsonValue)>>>;

    #[derive(Default)]
    struct RecordingChannel {
        sent: Sent,
        closed: Arc<Mutex<bool>>,
    }

    #[async_trait::async_trait]
    impl ControlChannel for RecordingChannel {
        async fn emit(&mut self, event: &str, payload: JsonValue) -> Result<(), ControlError> {
            self.sent.lock().unwrap().push((event.to_string(), payload));
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ControlError> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    async fn connected() -> (KeonManager<RecordingChannel>, Sent) {
        let channel = RecordingChannel::default();
        let sent = channel.sent.clone();
        let mut manager = KeonManager::new(|_| {});
        manager.init(channel).await.unwrap();
        (manager, sent)
    }

    #[tokio::test]
    async fn movement_commands() {
        let (mut manager, sent) = connected().await;
        manager.move_to(60, 90).await.unwrap();
        manager.movement_between(30, 10, 80).await.unwrap();
        manager.stop().await.unwrap();

        assert_eq!(
            *sent.lock().unwrap(),
            vec![
                (
                    "send_command_to_devices".to_string(),
                    json!({ "command_type": "MOVEMENT", "arguments": { "speed": 60, "position": 90 } })
                ),
                (
                    "send_command_to_devices".to_string(),
                    json!({
                        "command_type": "MOVEMENT_BETWEEN",
                        "arguments": { "speed": 30, "min_position": 10, "max_position": 80 }
                    })
                ),
                (
                    "send_command_to_devices".to_string(),
                    json!({ "command_type": "PAUSE", "arguments": {} })
                ),
            ]
        );
    }

    #[tokio::test]
    async fn positions_out_of_range_are_rejected() {
        let (mut manager, sent) = connected().await;
        assert!(matches!(
            manager.move_to(50, 91).await,
            Err(ControlError::InvalidArgument(_))
        ));
        assert!(matches!(
            manager.movement_between(50, 0, 200).await,
            Err(ControlError::InvalidArgument(_))
        ));
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn intensity_adjustment_sends_two_settings() {
        let (mut manager, sent) = connected().await;
        let start = tokio::time::Instant::now();
        manager.set_intensity_adjustment(3).await.unwrap();
        assert!(start.elapsed() >= DEFAULT_COMMAND_INTERVAL);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "send_settings_to_device");
        assert_eq!(
            sent[0].1,
            json!({ "setup_type": "speed_intensity_adjustment", "arguments": { "intensity": 6 } })
        );
        assert_eq!(
            sent[1].1,
            json!({ "setup_type": "range_intensity_adjustment", "arguments": { "intensity": 3 } })
        );
    }

    #[tokio::test]
    async fn status_and_reprovision_commands() {
        let (mut manager, sent) = connected().await;
        manager.force_status_report().await.unwrap();
        manager.set_status_update_interval(10).await.unwrap();
        manager.switch_to_bt_mode().await.unwrap();
        manager.reset_credentials().await.unwrap();

        let sent = sent.lock().unwrap();
        let names: Vec<&str> = sent.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            [
                "get_status_of_devices",
                "send_settings_to_device",
                "send_reprovision_command_to_device",
                "send_reprovision_command_to_device",
            ]
        );
        assert_eq!(sent[0].1, json!({}));
        assert_eq!(
            sent[2].1,
            json!({ "reprovision_type": "bt_mode", "arguments": {} })
        );
    }

    #[tokio::test]
    async fn closed_manager_rejects_commands() {
        let channel = RecordingChannel::default();
        let closed = channel.closed.clone();
        let mut manager = KeonManager::new(|_| {});
        assert!(matches!(manager.stop().await, Err(ControlError::NotConnected)));

        manager.init(channel).await.unwrap();
        assert!(manager.is_connected());
        manager.close().await.unwrap();
        assert!(*closed.lock().unwrap());
        assert!(!manager.is_connected());
        assert!(matches!(
            manager.move_to(10, 10).await,
            Err(ControlError::NotConnected)
        ));
        manager.close().await.unwrap();
    }

    #[tokio::test]
    async fn inbound_status_is_cached_and_cleared() {
        let (mut manager, _) = connected().await;
        manager.handle_inbound(
            "device_status",
            json!({ "payload": { "KEON": { "serial_number": "SN9", "battery_status": 55 } } }),
        );
        let status = manager.device_status().unwrap();
        assert_eq!(status.serial_number.as_deref(), Some("SN9"));
        assert_eq!(status.battery_status, Some(55.0));

        manager.handle_inbound(
            "device_status",
            json!({ "payload": { "KEON": { "serial_number": "SN9", "error_code": null } } }),
        );
        assert_eq!(
            manager.device_status().and_then(|s| s.serial_number.as_deref()),
            Some("SN9")
        );

        manager.handle_inbound("device_status", json!({ "payload": { "OTHER": {} } }));
        assert!(manager.device_status().is_none());
    }

    #[tokio::test]
    async fn user_activity_reaches_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut manager: KeonManager<RecordingChannel> =
            KeonManager::new(move |activity| sink.lock().unwrap().push(activity));

        manager.handle_inbound("user_activity_on_device", json!({ "action": "tap" }));
        manager.handle_inbound("unknown_event", json!({}));
        assert_eq!(*seen.lock().unwrap(), vec![json!({ "action": "tap" })]);
    }

    #[test]
    fn serialization_failures_are_encode_errors() {
        let err = serde_json::from_str::<JsonValue>("{").unwrap_err();
        let err = ControlError::from(err);
        assert!(matches!(err, ControlError::Encode(_)));
        assert!(err.to_string().starts_with("cannot encode payload"));
    }

    #[tokio::test]
    async fn server_disconnect_detaches_channel() {
        let (mut manager, _) = connected().await;
        manager.handle_inbound("disconnect", json!("io server disconnect"));
        assert!(matches!(
            manager.force_status_report().await,
            Err(ControlError::NotConnected)
        ));
    }
}
