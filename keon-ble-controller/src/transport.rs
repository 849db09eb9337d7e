//! GATT transport used by the provisioning driver

use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use keon_proto::ble::DEFAULT_MTU_SIZE;

use crate::BleError;

/// Exclusive access to the provisioning characteristic of one device.
///
/// Methods take `&mut self`, so a session can never have two operations in
/// flight on the same characteristic.
#[async_trait::async_trait]
pub trait GattTransport: Send {
    /// Write `data` to the characteristic, waiting for the write response
    async fn write(&mut self, data: &[u8]) -> Result<(), BleError>;

    /// Read the characteristic's current value
    async fn read(&mut self) -> Result<Vec<u8>, BleError>;

    /// Maximum bytes a single write may carry
    fn mtu(&self) -> usize {
        DEFAULT_MTU_SIZE
    }
}

/// [`GattTransport`] over a connected btleplug peripheral.
///
/// btleplug does not expose the negotiated MTU, so the default is assumed.
pub struct BtleplugTransport {
    peripheral: Peripheral,
    characteristic: Characteristic,
}

impl BtleplugTransport {
    pub fn new(peripheral: Peripheral, characteristic: Characteristic) -> Self {
        Self {
            peripheral,
            characteristic,
        }
    }
}

#[async_trait::async_trait]
impl GattTransport for BtleplugTransport {
    async fn write(&mut self, data: &[u8]) -> Result<(), BleError> {
        self.peripheral
            .write(&self.characteristic, data, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Vec<u8>, BleError> {
        Ok(self.peripheral.read(&self.characteristic).await?)
    }
}
