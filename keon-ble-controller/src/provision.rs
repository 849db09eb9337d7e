//! Async driver for the provisioning handshake

use std::future::Future;
use std::time::Duration;

use keon_proto::{Action, Provisioner, Stage};
use tracing::{debug, error, info};

use crate::{BleError, GattTransport, ProvisionError};

#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Upper bound for every single GATT write or read
    pub timeout: Duration,
    /// MTU used to size token chunks, `None` to use the transport's
    pub mtu: Option<usize>,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            mtu: None,
        }
    }
}

/// Push WiFi credentials and the registration token onto the device.
///
/// Stages run strictly one after another. Any status byte other than the
/// acknowledgement aborts the whole attempt; the caller restarts from the
/// beginning if it wants to retry.
pub async fn provision<T: GattTransport + ?Sized>(
    transport: &mut T,
    ssid: &str,
    password: &str,
    registration_token: &str,
    options: &ProvisionOptions,
) -> Result<(), ProvisionError> {
    if ssid.is_empty() {
        return Err(ProvisionError::InvalidInput("WiFi SSID is empty"));
    }
    if password.is_empty() {
        return Err(ProvisionError::InvalidInput("WiFi password is empty"));
    }
    if registration_token.is_empty() {
        return Err(ProvisionError::InvalidInput("registration token is empty"));
    }

    let mtu = options.mtu.unwrap_or_else(|| transport.mtu());
    let mut machine = Provisioner::new(ssid, password, registration_token, mtu)?;
    info!(
        ssid,
        mtu,
        token_len = registration_token.len(),
        token_chunks = machine.token_chunk_count(),
        "starting provisioning"
    );

    loop {
        let stage = machine.stage();
        match machine.next_action()? {
            Action::Write(bytes) => {
                debug!(%stage, len = bytes.len(), "writing");
                bounded(stage, options.timeout, transport.write(bytes)).await?;
                machine.written()?;
            }
            Action::ReadStatus => {
                let value = bounded(stage, options.timeout, transport.read()).await?;
                let status = *value.first().ok_or(ProvisionError::EmptyStatus { stage })?;
                if let Err(e) = machine.status_received(status) {
                    error!(%stage, status, "unexpected status code");
                    return Err(e.into());
                }
                info!(%stage, status, "status code");
            }
            Action::Done => {
                info!("provisioning complete");
                return Ok(());
            }
        }
    }
}

async fn bounded<F, O>(stage: Stage, after: Duration, op: F) -> Result<O, ProvisionError>
where
    F: Future<Output = Result<O, BleError>>,
{
    match tokio::time::timeout(after, op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(ProvisionError::ConnectionLost { stage, source }),
        Err(_) => Err(ProvisionError::Timeout { stage, after }),
    }
}
