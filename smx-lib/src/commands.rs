//! The closed set of stage commands: symbolic ids, wire opcodes, declared
//! response shapes, and typed request encoding.
//!
//! Commands are defined once in a static table and never registered at
//! runtime. Argument validation happens during encoding, before any bytes
//! reach the transport.

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::config::StageConfig;
use crate::constants::{LIGHT_STRIP_LEDS, SERIAL_NUMBER_LEN};
use crate::error::SmxError;
use crate::packet::{self, Report};
use crate::sensors::{PanelTestMode, SensorTestMode};

/// Symbolic command identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum CommandId {
    GetDeviceInfo,
    GetConfig,
    WriteConfig,
    SetLightStrip,
    ForceRecalibration,
    GetSensorTestData,
    SetSerialNumber,
    SetPanelTestMode,
    GetInputs,
}

/// Shape of the response a command completes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Empty acknowledgment frame.
    Ack,
    /// Device info block, leading byte `I`.
    DeviceInfo,
    /// Config blob behind an opcode echo and size byte.
    Config,
    /// Per-panel detail blocks behind an opcode echo and size byte.
    SensorTestData,
    /// Input-state report, outside the command channel.
    Inputs,
}

/// One entry of the static command table.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub id: CommandId,
    pub name: &'static str,
    /// Wire opcode. Zero for the two commands that bypass the normal payload
    /// framing (device info request, input-state read).
    pub opcode: u8,
    pub response: ResponseKind,
    /// Leading payload byte a data response is correlated by.
    pub echo: Option<u8>,
}

/// The command registry, indexed by `CommandId` discriminant.
pub const REGISTRY: &[CommandSpec] = &[
    CommandSpec {
        id: CommandId::GetDeviceInfo,
        name: "GET_DEVICE_INFO",
        opcode: 0,
        response: ResponseKind::DeviceInfo,
        echo: Some(b'I'),
    },
    CommandSpec {
        id: CommandId::GetConfig,
        name: "GET_CONFIG",
        opcode: b'G',
        response: ResponseKind::Config,
        echo: Some(b'G'),
    },
    CommandSpec {
        id: CommandId::WriteConfig,
        name: "WRITE_CONFIG",
        opcode: b'W',
        response: ResponseKind::Ack,
        echo: None,
    },
    CommandSpec {
        id: CommandId::SetLightStrip,
        name: "SET_LIGHT_STRIP",
        opcode: b'L',
        response: ResponseKind::Ack,
        echo: None,
    },
    CommandSpec {
        id: CommandId::ForceRecalibration,
        name: "FORCE_RECALIBRATION",
        opcode: b'C',
        response: ResponseKind::Ack,
        echo: None,
    },
    CommandSpec {
        id: CommandId::GetSensorTestData,
        name: "GET_SENSOR_TEST_DATA",
        opcode: b't',
        response: ResponseKind::SensorTestData,
        echo: Some(b't'),
    },
    CommandSpec {
        id: CommandId::SetSerialNumber,
        name: "SET_SERIAL_NUMBER",
        opcode: b'S',
        response: ResponseKind::Ack,
        echo: None,
    },
    CommandSpec {
        id: CommandId::SetPanelTestMode,
        name: "SET_PANEL_TEST_MODE",
        opcode: b'P',
        response: ResponseKind::Ack,
        echo: None,
    },
    CommandSpec {
        id: CommandId::GetInputs,
        name: "GET_INPUTS",
        opcode: 0,
        response: ResponseKind::Inputs,
        echo: None,
    },
];

impl CommandId {
    pub const fn spec(self) -> &'static CommandSpec {
        &REGISTRY[self as usize]
    }

    /// Look a command up by its symbolic name.
    pub fn resolve(name: &str) -> Result<CommandId, SmxError> {
        REGISTRY
            .iter()
            .find(|spec| spec.name == name)
            .map(|spec| spec.id)
            .ok_or_else(|| SmxError::UnknownCommand(name.to_string()))
    }
}

/// An RGB color for the platform light strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A fully-typed command with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    GetDeviceInfo,
    GetConfig,
    WriteConfig(StageConfig),
    SetLightStrip(Vec<Rgb>),
    ForceRecalibration,
    GetSensorTestData(SensorTestMode),
    SetSerialNumber([u8; SERIAL_NUMBER_LEN]),
    SetPanelTestMode(PanelTestMode),
    GetInputs,
}

impl Request {
    pub fn command(&self) -> CommandId {
        match self {
            Request::GetDeviceInfo => CommandId::GetDeviceInfo,
            Request::GetConfig => CommandId::GetConfig,
            Request::WriteConfig(_) => CommandId::WriteConfig,
            Request::SetLightStrip(_) => CommandId::SetLightStrip,
            Request::ForceRecalibration => CommandId::ForceRecalibration,
            Request::GetSensorTestData(_) => CommandId::GetSensorTestData,
            Request::SetSerialNumber(_) => CommandId::SetSerialNumber,
            Request::SetPanelTestMode(_) => CommandId::SetPanelTestMode,
            Request::GetInputs => CommandId::GetInputs,
        }
    }

    /// Validate the arguments and encode the request into wire reports.
    ///
    /// Malformed requests fail here, before the transaction manager touches
    /// the transport.
    pub fn encode(&self) -> Result<Vec<Report>, SmxError> {
        let spec = self.command().spec();
        let payload = match self {
            Request::GetDeviceInfo => return Ok(vec![packet::device_info_report()]),
            // Input state is broadcast continuously; nothing to write.
            Request::GetInputs => return Ok(Vec::new()),
            Request::GetConfig | Request::ForceRecalibration => vec![spec.opcode],
            Request::WriteConfig(config) => {
                let mut payload = Vec::with_capacity(1 + crate::constants::CONFIG_SIZE);
                payload.push(spec.opcode);
                payload.extend_from_slice(&config.encode()?);
                payload
            }
            Request::SetLightStrip(colors) => {
                if colors.len() != LIGHT_STRIP_LEDS {
                    return Err(SmxError::InvalidArgument(format!(
                        "light strip takes exactly {LIGHT_STRIP_LEDS} colors, got {}",
                        colors.len()
                    )));
                }
                let mut payload = vec![spec.opcode, 0, LIGHT_STRIP_LEDS as u8];
                for color in colors {
                    payload.extend_from_slice(&[color.r, color.g, color.b]);
                }
                payload
            }
            Request::GetSensorTestData(mode) => {
                if *mode == SensorTestMode::Off {
                    return Err(SmxError::InvalidArgument(
                        "sensor test mode OFF produces no data to read".to_string(),
                    ));
                }
                vec![spec.opcode, (*mode).into()]
            }
            Request::SetSerialNumber(serial) => {
                let mut payload = Vec::with_capacity(1 + SERIAL_NUMBER_LEN);
                payload.push(spec.opcode);
                payload.extend_from_slice(serial);
                payload
            }
            Request::SetPanelTestMode(mode) => vec![spec.opcode, (*mode).into()],
        };
        Ok(packet::encode_frames(&payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_indexed_by_discriminant() {
        for (index, spec) in REGISTRY.iter().enumerate() {
            assert_eq!(spec.id as usize, index, "registry order broke for {}", spec.name);
            assert_eq!(spec.id.spec().name, spec.name);
        }
    }

    #[test]
    fn resolve_finds_registered_names() {
        assert_eq!(
            CommandId::resolve("SET_LIGHT_STRIP").unwrap(),
            CommandId::SetLightStrip
        );
    }

    #[test]
    fn resolve_rejects_unknown_names() {
        assert!(matches!(
            CommandId::resolve("UPLOAD_GIF"),
            Err(SmxError::UnknownCommand(_))
        ));
    }

    #[test]
    fn light_strip_count_is_validated_before_encoding() {
        let short = Request::SetLightStrip(vec![Rgb::new(1, 2, 3); 10]);
        assert!(matches!(short.encode(), Err(SmxError::InvalidArgument(_))));

        let full = Request::SetLightStrip(vec![Rgb::new(1, 2, 3); LIGHT_STRIP_LEDS]);
        assert!(full.encode().is_ok());
    }

    #[test]
    fn sensor_test_off_is_rejected() {
        let request = Request::GetSensorTestData(SensorTestMode::Off);
        assert!(matches!(request.encode(), Err(SmxError::InvalidArgument(_))));
    }
}
