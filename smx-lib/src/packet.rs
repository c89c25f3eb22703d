//! Report-level framing between logical frame bodies and 64-byte transfers.
//!
//! A logical frame body is the command payload followed by its checksum byte.
//! Bodies longer than one report are split across several, delimited by the
//! START/END flag bits; the size byte in each report delimits the data, so
//! payload bytes equal to the flag values need no escaping.

use bytes::Bytes;
use thiserror::Error;

use crate::checksum;
use crate::constants::*;
use crate::error::SmxError;

/// One raw 64-byte transfer.
pub type Report = [u8; REPORT_SIZE];

/// Malformed report stream. All variants are retryable at the transaction
/// level; none of them abort the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("report starts with unrecognized report id {0:#04x}")]
    BadStart(u8),

    #[error("report shorter than the {REPORT_HEADER_SIZE}-byte header: {0} bytes")]
    Truncated(usize),

    #[error("size byte claims {size} data bytes but the report holds {len}")]
    Oversized { size: usize, len: usize },

    #[error("new frame started while {0} bytes of a previous frame were buffered")]
    Interrupted(usize),
}

/// A completed logical frame read from the stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Empty frame body: the stage acknowledged a command with no output.
    Ack,
    /// Non-empty frame body with a verified checksum, checksum stripped.
    Message(Bytes),
}

impl Frame {
    /// Validate an assembled frame body and strip the integrity byte.
    pub fn from_body(body: Vec<u8>) -> Result<Frame, SmxError> {
        if body.is_empty() {
            return Ok(Frame::Ack);
        }
        let payload = checksum::verify(&body)?;
        Ok(Frame::Message(Bytes::copy_from_slice(payload)))
    }
}

/// Encode a command payload into host-to-stage reports.
pub fn encode_frames(payload: &[u8]) -> Vec<Report> {
    frames_with_report_id(REPORT_ID_HOST_COMMAND, payload)
}

/// Encode a response payload into stage-to-host reports. The stage firmware
/// produces these; the host side only needs them for emulated transports and
/// tests.
pub fn encode_response_frames(payload: &[u8]) -> Vec<Report> {
    frames_with_report_id(REPORT_ID_COMMAND_DATA, payload)
}

/// The bare acknowledgment report the stage sends for commands with no
/// response data.
pub fn ack_report() -> Report {
    let mut report = [0u8; REPORT_SIZE];
    report[0] = REPORT_ID_COMMAND_DATA;
    report[1] = FLAG_START_OF_COMMAND | FLAG_HOST_CMD_FINISHED | FLAG_END_OF_COMMAND;
    report
}

/// The single-report device info request. This bypasses the normal payload
/// framing: the request is just the DEVICE_INFO flag with no data.
pub fn device_info_report() -> Report {
    let mut report = [0u8; REPORT_SIZE];
    report[0] = REPORT_ID_HOST_COMMAND;
    report[1] = FLAG_DEVICE_INFO;
    report
}

fn frames_with_report_id(report_id: u8, payload: &[u8]) -> Vec<Report> {
    let mut body = Vec::with_capacity(payload.len() + 1);
    body.extend_from_slice(payload);
    body.push(checksum::compute(payload));

    let mut reports = Vec::with_capacity(body.len().div_ceil(MAX_REPORT_DATA));
    let mut idx = 0;
    loop {
        let chunk = (body.len() - idx).min(MAX_REPORT_DATA);

        let mut flags = 0;
        if idx == 0 {
            flags |= FLAG_START_OF_COMMAND;
        }
        if idx + chunk == body.len() {
            flags |= FLAG_END_OF_COMMAND;
        }

        let mut report = [0u8; REPORT_SIZE];
        report[0] = report_id;
        report[1] = flags;
        report[2] = chunk as u8;
        report[REPORT_HEADER_SIZE..REPORT_HEADER_SIZE + chunk]
            .copy_from_slice(&body[idx..idx + chunk]);
        reports.push(report);

        idx += chunk;
        if idx >= body.len() {
            break;
        }
    }
    reports
}

/// Reassembles logical frame bodies from the inbound report stream.
///
/// Reports are transient: the assembler consumes them as they arrive and only
/// the accumulating frame body persists between calls. Input-state reports
/// interleave freely with command responses and are skipped here.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard any partially assembled frame. Called at the start of every
    /// transaction so a cancelled exchange cannot corrupt the next decode.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Feed one inbound report. Returns the assembled frame body once the
    /// END flag arrives, `None` while more reports are expected or the
    /// report carried nothing for the command channel.
    pub fn push_report(&mut self, report: &[u8]) -> Result<Option<Vec<u8>>, FrameError> {
        let Some(&report_id) = report.first() else {
            // Empty reads happen on a quiet interrupt endpoint.
            return Ok(None);
        };

        match report_id {
            REPORT_ID_INPUT => Ok(None),
            REPORT_ID_COMMAND_DATA => self.push_command_report(report),
            other => Err(FrameError::BadStart(other)),
        }
    }

    fn push_command_report(&mut self, report: &[u8]) -> Result<Option<Vec<u8>>, FrameError> {
        if report.len() < REPORT_HEADER_SIZE {
            return Err(FrameError::Truncated(report.len()));
        }

        let flags = report[1];
        let size = report[2] as usize;
        if REPORT_HEADER_SIZE + size > report.len() {
            return Err(FrameError::Oversized {
                size,
                len: report.len(),
            });
        }

        if flags & FLAG_START_OF_COMMAND != 0 && !self.buf.is_empty() {
            // A START report must only arrive with an empty buffer. The
            // previous frame never ended; drop it rather than splice the two.
            let pending = self.buf.len();
            self.reset();
            return Err(FrameError::Interrupted(pending));
        }

        self.buf
            .extend_from_slice(&report[REPORT_HEADER_SIZE..REPORT_HEADER_SIZE + size]);

        if flags & FLAG_END_OF_COMMAND != 0 {
            return Ok(Some(std::mem::take(&mut self.buf)));
        }
        Ok(None)
    }
}
