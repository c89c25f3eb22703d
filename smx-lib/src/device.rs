//! High-level session with one stage.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::commands::{Request, Rgb};
use crate::config::StageConfig;
use crate::constants::{LIGHT_STRIP_LEDS, SERIAL_NUMBER_LEN};
use crate::device_info::DeviceInfo;
use crate::error::SmxError;
use crate::inputs::InputState;
use crate::sensors::{PanelTestMode, SensorTestData, SensorTestMode};
use crate::transaction::{Response, RetryPolicy, TransactionManager};
use crate::transport::{Transport, UsbTransport};

/// What happened to a serial number write.
///
/// The stage only accepts a serial when it has none; writing to a stage that
/// already has one is acknowledged and ignored by the firmware. That no-op is
/// a documented outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerialOutcome {
    /// The stage took the new serial.
    Applied,
    /// The stage kept the serial it already had.
    AlreadySet { current: String },
}

/// A session with one physical stage.
///
/// The session exclusively owns its transport and serializes every command
/// through a single in-flight-transaction slot; separate stages are separate
/// sessions and independent of each other.
pub struct SmxStage<T: Transport> {
    manager: TransactionManager<T>,
}

impl SmxStage<UsbTransport> {
    /// Connect to the first stage found.
    pub async fn open() -> Result<Self, SmxError> {
        Ok(Self::with_transport(UsbTransport::open_first().await?))
    }

    /// Connect to the stage with the given USB serial number.
    pub async fn open_serial(serial: &str) -> Result<Self, SmxError> {
        Ok(Self::with_transport(UsbTransport::open_serial(serial).await?))
    }
}

impl<T: Transport> SmxStage<T> {
    pub fn with_transport(transport: T) -> Self {
        Self::with_policy(transport, RetryPolicy::default())
    }

    pub fn with_policy(transport: T, policy: RetryPolicy) -> Self {
        Self {
            manager: TransactionManager::new(transport, policy),
        }
    }

    /// Read the stage's identity block.
    pub async fn get_device_info(&self) -> Result<DeviceInfo, SmxError> {
        let payload = self.data(&Request::GetDeviceInfo).await?;
        DeviceInfo::decode(&payload)
    }

    /// Read the current configuration.
    ///
    /// Reads back whatever was last written with [`write_stage_config`], or
    /// the firmware defaults. Stages below firmware version 5 are not
    /// supported.
    ///
    /// [`write_stage_config`]: Self::write_stage_config
    pub async fn get_stage_config(&self) -> Result<StageConfig, SmxError> {
        let info = self.get_device_info().await?;
        if info.firmware_version < 5 {
            return Err(SmxError::UnsupportedVersion(info.firmware_version));
        }

        let payload = self.data(&Request::GetConfig).await?;
        StageConfig::decode(info.firmware_version, sized_payload("GET_CONFIG", &payload)?)
    }

    /// Write a configuration to the stage.
    ///
    /// The config is validated and encoded into an immutable snapshot before
    /// anything is written, so a malformed config never reaches the wire and
    /// later mutation by the caller has no effect on the in-flight write. The
    /// write either completes with the stage's acknowledgment or fails; there
    /// is no partial application.
    pub async fn write_stage_config(&self, config: &StageConfig) -> Result<(), SmxError> {
        self.ack(&Request::WriteConfig(config.clone())).await
    }

    /// Restore the canonical factory configuration.
    ///
    /// Writing the config alone does not touch the lights, so the platform
    /// strip is set to the default color afterwards.
    pub async fn factory_reset(&self) -> Result<(), SmxError> {
        info!("factory resetting stage");
        let defaults = StageConfig::default();
        let strip = Rgb::new(
            defaults.platform_strip_color[0],
            defaults.platform_strip_color[1],
            defaults.platform_strip_color[2],
        );
        self.write_stage_config(&defaults).await?;
        self.set_light_strip(&[strip; LIGHT_STRIP_LEDS]).await
    }

    /// Set the platform LED strip, one color per LED.
    pub async fn set_light_strip(&self, colors: &[Rgb]) -> Result<(), SmxError> {
        self.ack(&Request::SetLightStrip(colors.to_vec())).await
    }

    /// Make every panel re-tare its sensors.
    pub async fn force_recalibration(&self) -> Result<(), SmxError> {
        self.ack(&Request::ForceRecalibration).await
    }

    /// Read one round of per-panel sensor diagnostics in the given mode.
    pub async fn get_sensor_test_data(
        &self,
        mode: SensorTestMode,
    ) -> Result<SensorTestData, SmxError> {
        let payload = self.data(&Request::GetSensorTestData(mode)).await?;
        SensorTestData::decode(mode, sized_payload("GET_SENSOR_TEST_DATA", &payload)?)
    }

    /// Write the device serial number.
    ///
    /// The firmware enforces write-once semantics; the outcome is read back
    /// so a stage that kept its existing serial is reported as
    /// [`SerialOutcome::AlreadySet`].
    pub async fn set_serial_number(&self, serial: &[u8]) -> Result<SerialOutcome, SmxError> {
        let serial: [u8; SERIAL_NUMBER_LEN] = serial.try_into().map_err(|_| {
            SmxError::InvalidArgument(format!(
                "serial number must be {SERIAL_NUMBER_LEN} bytes, got {}",
                serial.len()
            ))
        })?;

        self.ack(&Request::SetSerialNumber(serial)).await?;

        let info = self.get_device_info().await?;
        if info.serial == hex::encode_upper(serial) {
            Ok(SerialOutcome::Applied)
        } else {
            info!(current = %info.serial, "stage kept its existing serial number");
            Ok(SerialOutcome::AlreadySet {
                current: info.serial,
            })
        }
    }

    /// Switch panels between normal button events and pressure diagnostics.
    pub async fn set_panel_test_mode(&self, mode: PanelTestMode) -> Result<(), SmxError> {
        self.ack(&Request::SetPanelTestMode(mode)).await
    }

    /// Read the next input-state report: which panels are pressed.
    pub async fn get_inputs(&self) -> Result<InputState, SmxError> {
        match self.manager.transact(&Request::GetInputs).await? {
            Response::Inputs(state) => Ok(state),
            other => Err(unexpected("GET_INPUTS", &other)),
        }
    }

    async fn data(&self, request: &Request) -> Result<bytes::Bytes, SmxError> {
        match self.manager.transact(request).await? {
            Response::Data(payload) => Ok(payload),
            other => Err(unexpected(request.command().spec().name, &other)),
        }
    }

    async fn ack(&self, request: &Request) -> Result<(), SmxError> {
        match self.manager.transact(request).await? {
            Response::Ack => Ok(()),
            other => Err(unexpected(request.command().spec().name, &other)),
        }
    }
}

/// Strip the opcode echo and size byte from a data response, returning the
/// sized body.
fn sized_payload<'a>(command: &'static str, payload: &'a [u8]) -> Result<&'a [u8], SmxError> {
    if payload.len() < 2 {
        return Err(SmxError::Protocol(format!(
            "{command} response shorter than its two-byte header: {} bytes",
            payload.len()
        )));
    }
    let size = payload[1] as usize;
    payload.get(2..2 + size).ok_or_else(|| {
        SmxError::Protocol(format!(
            "{command} response claims {size} bytes but carries {}",
            payload.len() - 2
        ))
    })
}

fn unexpected(command: &'static str, response: &Response) -> SmxError {
    SmxError::UnexpectedResponse {
        command,
        detail: format!("{response:?}"),
    }
}
