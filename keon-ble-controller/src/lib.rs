//! Keon BLE Controller
//!
//! BLE client for discovering Keon devices and pushing WiFi and cloud
//! registration credentials onto them.
//!
//! # Example
//!
//! ```ignore
//! use keon_ble_controller::{ble, ProvisionOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = ble::get_adapter().await?;
//!
//!     // Scan for devices
//!     for device in ble::scan(&adapter, 5).await? {
//!         println!("{} ({})", device.name, device.address);
//!     }
//!
//!     // Provision the first Keon in range
//!     let peripheral = ble::find_device(&adapter, None, 5).await?;
//!     let info = ble::provision_device(
//!         peripheral,
//!         "MySSID",
//!         "MyPassword",
//!         "REGISTRATION_TOKEN",
//!         &ProvisionOptions::default(),
//!     )
//!     .await?;
//!     println!("provisioned {:?}", info.serial_number);
//!
//!     Ok(())
//! }
//! ```

pub mod ble;
mod error;
mod provision;
mod transport;

pub use error::{BleError, ProvisionError};
pub use provision::{ProvisionOptions, provision};
pub use transport::{BtleplugTransport, GattTransport};

pub use keon_proto::{ProtocolError, Stage};
