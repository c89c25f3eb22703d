use std::io;

use thiserror::Error;

use crate::packet::FrameError;

/// The primary error type for the `smx-lib` library.
#[derive(Error, Debug)]
pub enum SmxError {
    #[error("no StepManiaX stage found. Is the stage connected?")]
    DeviceNotFound,

    #[error("USB transfer error: {0}")]
    Usb(#[from] nusb::transfer::TransferError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("timed out waiting for the stage to respond")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("checksum mismatch: computed {expected:#04x}, frame carried {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported config version {0}: only firmware version 5 and up is supported")]
    UnsupportedVersion(u16),

    #[error("config field `{field}`: expected {expected} values, got {actual}")]
    ConfigShape {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("config field `{field}`: value {value} exceeds maximum {max}")]
    ValueOutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },

    #[error("config blob size mismatch: expected {expected} bytes, got {actual}")]
    ConfigSize { expected: usize, actual: usize },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unexpected response to {command}: {detail}")]
    UnexpectedResponse {
        command: &'static str,
        detail: String,
    },
}

impl SmxError {
    /// Whether the transaction manager may retry the exchange after this
    /// failure. Corrupt or missing responses are transient USB noise; every
    /// other category is either fatal to the session or a caller bug.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SmxError::Timeout(_) | SmxError::Frame(_) | SmxError::ChecksumMismatch { .. }
        )
    }
}
