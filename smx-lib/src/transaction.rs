//! One-at-a-time request/response exchange with a stage.
//!
//! The wire protocol is half-duplex: a new command must never be written
//! while a response is outstanding. The manager owns the transport behind an
//! async mutex, which is the single in-flight-transaction slot; concurrent
//! callers against the same session queue on it. Dropping a `transact`
//! future releases the slot, and every attempt starts by clearing the frame
//! assembler so a cancelled exchange cannot poison the next decode.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::commands::{CommandId, CommandSpec, Request, ResponseKind};
use crate::constants::REPORT_ID_INPUT;
use crate::error::SmxError;
use crate::inputs::InputState;
use crate::packet::{Frame, FrameAssembler, Report};
use crate::transport::Transport;

/// Lifecycle of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Created,
    Sent,
    AwaitingResponse,
    Completed,
    TimedOut,
    Failed,
}

/// Timeout and retry configuration for a session.
///
/// Retries cover transient USB noise only: corrupt frames, bad checksums,
/// and missing responses. Protocol-level failures and caller errors are
/// surfaced immediately.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Extra attempts after the first failed one.
    pub retries: u32,
    /// How long to wait for a correlated response per attempt.
    pub response_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            response_timeout: Duration::from_secs(3),
        }
    }
}

/// A decoded, correlated response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Ack,
    Data(Bytes),
    Inputs(InputState),
}

struct PendingTransaction {
    command: CommandId,
    started: Instant,
    state: TransactionState,
}

impl PendingTransaction {
    fn new(command: CommandId) -> Self {
        debug!(%command, "transaction created");
        Self {
            command,
            started: Instant::now(),
            state: TransactionState::Created,
        }
    }

    fn transition(&mut self, next: TransactionState) {
        debug!(
            command = %self.command,
            from = ?self.state,
            to = ?next,
            elapsed = ?self.started.elapsed(),
            "transaction state"
        );
        self.state = next;
    }
}

struct Inner<T> {
    transport: T,
    assembler: FrameAssembler,
}

/// Serializes all protocol traffic of one session through a single slot.
pub struct TransactionManager<T> {
    inner: Mutex<Inner<T>>,
    policy: RetryPolicy,
}

impl<T: Transport> TransactionManager<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner {
                transport,
                assembler: FrameAssembler::new(),
            }),
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run one command to completion, retrying transient failures up to the
    /// configured limit.
    pub async fn transact(&self, request: &Request) -> Result<Response, SmxError> {
        // Argument and shape validation happens here, before the slot is
        // taken and before anything touches the transport.
        let reports = request.encode()?;
        let spec = request.command().spec();

        let mut inner = self.inner.lock().await;
        let mut attempt = 0;
        loop {
            match Self::run_attempt(&mut inner, spec, &reports, self.policy.response_timeout).await
            {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < self.policy.retries => {
                    attempt += 1;
                    warn!(
                        command = %spec.id,
                        attempt,
                        error = %err,
                        "transaction attempt failed, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn run_attempt(
        inner: &mut Inner<T>,
        spec: &CommandSpec,
        reports: &[Report],
        response_timeout: Duration,
    ) -> Result<Response, SmxError> {
        // A cancelled or failed exchange may have left a partial frame.
        inner.assembler.reset();
        let mut txn = PendingTransaction::new(spec.id);

        for report in reports {
            if let Err(err) = inner.transport.write_report(report).await {
                txn.transition(TransactionState::Failed);
                return Err(err);
            }
        }
        txn.transition(TransactionState::Sent);
        txn.transition(TransactionState::AwaitingResponse);

        let deadline = Instant::now() + response_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let report = match inner.transport.read_report(remaining).await {
                Ok(report) => report,
                Err(err @ SmxError::Timeout(_)) => {
                    txn.transition(TransactionState::TimedOut);
                    return Err(err);
                }
                Err(err) => {
                    txn.transition(TransactionState::Failed);
                    return Err(err);
                }
            };

            if spec.response == ResponseKind::Inputs {
                if report.first() == Some(&REPORT_ID_INPUT) {
                    let state = InputState::from_report(&report)?;
                    txn.transition(TransactionState::Completed);
                    return Ok(Response::Inputs(state));
                }
                continue;
            }

            let body = match inner.assembler.push_report(&report) {
                Ok(Some(body)) => body,
                Ok(None) => continue,
                Err(err) => {
                    txn.transition(TransactionState::Failed);
                    return Err(err.into());
                }
            };

            let frame = match Frame::from_body(body) {
                Ok(frame) => frame,
                Err(err) => {
                    txn.transition(TransactionState::Failed);
                    return Err(err);
                }
            };

            match correlate(spec, frame) {
                Some(response) => {
                    txn.transition(TransactionState::Completed);
                    return Ok(response);
                }
                // Not ours: a leftover ack or a response another program
                // requested. Keep reading until the deadline.
                None => continue,
            }
        }
    }
}

fn correlate(spec: &CommandSpec, frame: Frame) -> Option<Response> {
    match (spec.response, frame) {
        (ResponseKind::Ack, Frame::Ack) => Some(Response::Ack),
        (_, Frame::Ack) => None,
        (ResponseKind::Ack, Frame::Message(_)) => None,
        (_, Frame::Message(payload)) => {
            if spec.echo.is_some_and(|echo| payload.first() == Some(&echo)) {
                Some(Response::Data(payload))
            } else {
                None
            }
        }
    }
}
