//! Host-side protocol engine for StepManiaX dance stage hardware.
//!
//! The stage speaks a vendor protocol over 64-byte USB reports: logical
//! frames are split across reports, guarded by a trailing checksum, and
//! carry single-letter commands with structured responses, the largest of
//! which is the packed 250-byte stage configuration. [`SmxStage`] is the
//! session facade over the whole stack.

pub mod checksum;
pub mod commands;
pub mod config;
pub mod constants;
pub mod device;
pub mod device_info;
pub mod error;
pub mod inputs;
pub mod packet;
pub mod sensors;
pub mod transaction;
pub mod transport;

pub use device::{SerialOutcome, SmxStage};
pub use error::SmxError;
