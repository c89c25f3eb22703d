//! Byte-in/byte-out transport boundary.
//!
//! The protocol engine only needs `write_report`/`read_report`; any USB
//! library or emulated device satisfying that contract is interchangeable.
//! `UsbTransport` is the real stage over `nusb`; `MockTransport` scripts a
//! device for tests and emulation.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nusb::transfer::RequestBuffer;
use nusb::Interface;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::constants::REPORT_SIZE;
use crate::error::SmxError;
use crate::packet;

// StepManiaX stages ship with the stock Arduino IDs; the product string
// disambiguates them from other Arduino devices.
pub const VID: u16 = 0x2341;
pub const PID: u16 = 0x8037;
pub const PRODUCT_NAME: &str = "StepManiaX";

pub const ENDPOINT_IN: u8 = 0x81;
pub const ENDPOINT_OUT: u8 = 0x02;

const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Minimal byte transport a stage session drives.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn write_report(&mut self, report: &[u8]) -> Result<(), SmxError>;

    /// Read one report, bounded by `timeout`. Never blocks indefinitely.
    async fn read_report(&mut self, timeout: Duration) -> Result<Vec<u8>, SmxError>;
}

/// Enumerate every connected stage.
pub fn list_stages() -> Result<Vec<nusb::DeviceInfo>, SmxError> {
    Ok(nusb::list_devices()?
        .filter(|d| {
            d.vendor_id() == VID
                && d.product_id() == PID
                && d.product_string() == Some(PRODUCT_NAME)
        })
        .collect())
}

/// A claimed USB interface to one physical stage. Exclusively owned by one
/// session; dropping it releases the interface.
pub struct UsbTransport {
    interface: Interface,
}

impl UsbTransport {
    /// Open the first stage found.
    pub async fn open_first() -> Result<Self, SmxError> {
        info!("searching for a StepManiaX stage...");
        let device_info = list_stages()?
            .into_iter()
            .next()
            .ok_or(SmxError::DeviceNotFound)?;
        Self::open(&device_info).await
    }

    /// Open the stage with the given USB serial number. Vendor and product
    /// ids are identical across stages, so the serial is the only way to pick
    /// one of several.
    pub async fn open_serial(serial: &str) -> Result<Self, SmxError> {
        let device_info = list_stages()?
            .into_iter()
            .find(|d| d.serial_number() == Some(serial))
            .ok_or(SmxError::DeviceNotFound)?;
        Self::open(&device_info).await
    }

    pub async fn open(device_info: &nusb::DeviceInfo) -> Result<Self, SmxError> {
        info!(
            "found stage on bus {} addr {}",
            device_info.bus_number(),
            device_info.device_address()
        );

        let device = device_info.open()?;
        device.reset()?;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let interface = device.detach_and_claim_interface(0)?;
        info!("interface claimed");
        Ok(Self { interface })
    }
}

impl Transport for UsbTransport {
    async fn write_report(&mut self, report: &[u8]) -> Result<(), SmxError> {
        let transfer = self.interface.interrupt_out(ENDPOINT_OUT, report.to_vec());
        let completion = timeout(WRITE_TIMEOUT, transfer).await?;
        let sent = completion.into_result()?;
        debug!("wrote {} bytes", sent.actual_length());
        Ok(())
    }

    async fn read_report(&mut self, read_timeout: Duration) -> Result<Vec<u8>, SmxError> {
        let buffer = RequestBuffer::new(REPORT_SIZE);
        let transfer = self.interface.interrupt_in(ENDPOINT_IN, buffer);
        let completion = timeout(read_timeout, transfer).await?;
        let data = completion.into_result()?;
        debug!("read {} bytes", data.len());
        Ok(data)
    }
}

/// A scripted transport: reads come from a queue, writes are recorded.
///
/// Cloning shares the underlying state, so a test can keep a handle while the
/// session owns the other.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    reads: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one raw report for a future read.
    pub fn queue_report(&self, report: impl Into<Vec<u8>>) {
        self.state.lock().unwrap().reads.push_back(report.into());
    }

    /// Queue a full framed response as the stage would send it.
    pub fn queue_response(&self, payload: &[u8]) {
        for report in packet::encode_response_frames(payload) {
            self.queue_report(report);
        }
    }

    /// Queue a bare acknowledgment.
    pub fn queue_ack(&self) {
        self.queue_report(packet::ack_report());
    }

    /// Every report written so far, oldest first.
    pub fn written_reports(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().unwrap().writes.len()
    }

    /// Reports still queued and unread.
    pub fn unread_count(&self) -> usize {
        self.state.lock().unwrap().reads.len()
    }
}

impl Transport for MockTransport {
    async fn write_report(&mut self, report: &[u8]) -> Result<(), SmxError> {
        self.state.lock().unwrap().writes.push(report.to_vec());
        Ok(())
    }

    async fn read_report(&mut self, read_timeout: Duration) -> Result<Vec<u8>, SmxError> {
        let next = self.state.lock().unwrap().reads.pop_front();
        match next {
            Some(report) => Ok(report),
            None => {
                // An idle device: nothing arrives until the deadline passes.
                timeout(read_timeout, std::future::pending::<()>()).await?;
                Err(SmxError::Protocol(
                    "mock transport read completed without data".to_string(),
                ))
            }
        }
    }
}
