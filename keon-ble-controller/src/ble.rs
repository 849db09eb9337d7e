//! BLE Client for Keon devices
//!
//! Provides functions to scan for, connect to and provision Keon WiFi
//! devices via BLE.

use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use keon_proto::ble::{
    BATTERY_LEVEL_UUID, DEVICE_NAME, FIRMWARE_VERSION_UUID, MANUFACTURER_NAME_UUID,
    PRIMARY_SERVICE_UUID, PROVISIONING_UUID, SERIAL_NUMBER_UUID, full_uuid,
};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{BleError, BtleplugTransport, ProvisionError, ProvisionOptions};

/// A discovered BLE device
#[derive(Debug, Clone, serde::Serialize)]
pub struct KeonDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    pub is_keon: bool,
}

/// Identity read from the device right after connecting
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: Option<String>,
    pub firmware_version: Option<String>,
    pub manufacturer_name: Option<String>,
    pub serial_number: Option<String>,
}

fn uuid16(short: u16) -> Uuid {
    Uuid::from_u128(full_uuid(short))
}

fn is_keon_name(name: &str) -> bool {
    name == DEVICE_NAME
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, BleError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(BleError::NoAdapter)
}

/// Scan for BLE devices
///
/// Returns every discovered device. Keon devices have `is_keon = true`.
pub async fn scan(adapter: &Adapter, duration_secs: u64) -> Result<Vec<KeonDevice>, BleError> {
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(duration_secs)).await;

    let peripherals = adapter.peripherals().await?;
    let mut devices = Vec::new();

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_else(|| "Unknown".to_string());
            let address = peripheral.address().to_string();
            let is_keon = is_keon_name(&name);
            devices.push(KeonDevice {
                name,
                address,
                rssi: props.rssi,
                is_keon,
            });
        }
    }

    adapter.stop_scan().await?;
    Ok(devices)
}

/// Find a Keon device by name/address pattern, or find any Keon device
pub async fn find_device(
    adapter: &Adapter,
    target: Option<&str>,
    duration_secs: u64,
) -> Result<Peripheral, BleError> {
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(duration_secs)).await;

    let peripherals = adapter.peripherals().await?;

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_default();
            let addr = peripheral.address().to_string();

            let matches = match target {
                Some(t) => name.contains(t) || addr.contains(t),
                None => is_keon_name(&name),
            };

            if matches {
                adapter.stop_scan().await?;
                info!(%name, %addr, "found device");
                return Ok(peripheral);
            }
        }
    }

    adapter.stop_scan().await?;
    Err(BleError::DeviceNotFound)
}

/// A live GATT connection to one Keon.
///
/// Call [`close`](Self::close) when done. A connection dropped without
/// closing disconnects in the background on the current tokio runtime.
pub struct KeonConnection {
    peripheral: Peripheral,
    closed: bool,
}

impl KeonConnection {
    /// Connect, discover services and read the device information
    /// characteristics. A failed information read leaves that field empty.
    pub async fn connect(peripheral: Peripheral) -> Result<(Self, DeviceInfo), BleError> {
        let name = peripheral
            .properties()
            .await?
            .and_then(|props| props.local_name);

        peripheral.connect().await?;
        let connection = Self {
            peripheral,
            closed: false,
        };
        connection.peripheral.discover_services().await?;

        let mut info = DeviceInfo {
            id: connection.peripheral.address().to_string(),
            name,
            ..Default::default()
        };
        info.firmware_version = connection.read_ascii("Firmware Version", FIRMWARE_VERSION_UUID).await;
        info.manufacturer_name = connection.read_ascii("Manufacturer Name", MANUFACTURER_NAME_UUID).await;
        info.serial_number = connection.read_ascii("Serial Number", SERIAL_NUMBER_UUID).await;

        info!(id = %info.id, firmware = ?info.firmware_version, "connected");
        Ok((connection, info))
    }

    async fn read_ascii(&self, label: &str, uuid: u16) -> Option<String> {
        let result = match self.characteristic(uuid) {
            Ok(characteristic) => self.peripheral.read(&characteristic).await.map_err(BleError::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(value) => Some(keon_proto::printable_ascii(&value)),
            Err(e) => {
                error!("error while reading {label}: {e}");
                None
            }
        }
    }

    fn characteristic(&self, short: u16) -> Result<Characteristic, BleError> {
        let uuid = uuid16(short);
        let service = uuid16(PRIMARY_SERVICE_UUID);
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid && c.service_uuid == service)
            .ok_or(BleError::CharacteristicNotFound(uuid))
    }

    pub async fn is_connected(&self) -> bool {
        !self.closed && self.peripheral.is_connected().await.unwrap_or(false)
    }

    /// Battery charge in percent
    pub async fn battery_level(&self) -> Result<u8, BleError> {
        let uuid = uuid16(BATTERY_LEVEL_UUID);
        let characteristic = self
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(BleError::CharacteristicNotFound(uuid))?;
        let value = self.peripheral.read(&characteristic).await?;
        value.first().copied().ok_or(BleError::EmptyValue(uuid))
    }

    /// Run the provisioning handshake over this connection
    pub async fn provision(
        &mut self,
        ssid: &str,
        password: &str,
        registration_token: &str,
        options: &ProvisionOptions,
    ) -> Result<(), ProvisionError> {
        if !self.is_connected().await {
            return Err(BleError::NotConnected.into());
        }
        let characteristic = self.characteristic(PROVISIONING_UUID)?;
        let mut transport = BtleplugTransport::new(self.peripheral.clone(), characteristic);
        crate::provision(&mut transport, ssid, password, registration_token, options).await
    }

    pub async fn close(mut self) -> Result<(), BleError> {
        self.closed = true;
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

impl Drop for KeonConnection {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let peripheral = self.peripheral.clone();
            handle.spawn(async move {
                if let Err(e) = peripheral.disconnect().await {
                    warn!("background disconnect failed: {e}");
                }
            });
        }
    }
}

/// Connect to `peripheral`, provision it and disconnect.
///
/// The device is disconnected whether or not provisioning succeeds.
pub async fn provision_device(
    peripheral: Peripheral,
    ssid: &str,
    password: &str,
    registration_token: &str,
    options: &ProvisionOptions,
) -> Result<DeviceInfo, ProvisionError> {
    let (mut connection, info) = KeonConnection::connect(peripheral).await?;
    let result = connection
        .provision(ssid, password, registration_token, options)
        .await;

    if let Err(e) = connection.close().await {
        warn!("disconnect after provisioning failed: {e}");
    }

    result.map(|()| info)
}
