mod frame;
mod link;

use num_derive::FromPrimitive;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use thiserror::Error;

use crate::results::Mode;

pub use frame::{checksum, decode, encode};
pub use link::Link;

pub type Result<T> = anyhow::Result<T>;

/// Leading byte of every frame in both directions.
pub const START_MARKER: u8 = 0xAB;
/// Address the controlling host uses on the bus.
pub const CONTROLLER_ADDRESS: u8 = 0x70;
/// Address the instrument answers from.
pub const INSTRUMENT_ADDRESS: u8 = 0x01;
/// Trailing parameter of the result query, echoed back in every result reply.
pub const RESULT_SENTINEL: u8 = 0xD7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Stop = 0x21,
    Start = 0x22,
    ProgramStep = 0x24,
    ClearSteps = 0x2C,
    Reply = 0x7F,
    Identify = 0x90,
    QueryResult = 0xB1,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("no start marker within {0} bytes")]
    MissingStartMarker(usize),
    #[error("frame addressed {dest:#04x} from {src:#04x} is not for us")]
    Framing { dest: u8, src: u8 },
    #[error("calculated checksum ({computed:02x}) does not match received ({received:02x})")]
    Checksum { computed: u8, received: u8 },
    #[error("sync error: expected {expected:#04x}, got {received:#04x}")]
    Sync { expected: u8, received: u8 },
    #[error("command error")]
    Command,
    #[error("parameter error (check values against the instrument's ranges)")]
    Parameter,
    #[error("unknown reply status {0}")]
    UnknownReply(u8),
    #[error("unknown result code {0:#04x}")]
    UnknownResultCode(u8),
    #[error("expected sentinel 0xd7, got {0:#04x}")]
    BadSentinel(u8),
    #[error("unknown test mode {0}")]
    UnknownMode(u8),
    #[error("truncated payload: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
    #[error("{0} results are not supported")]
    NotSupported(Mode),
    #[error("{field} value {value} does not fit the wire format")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("timed out waiting for the instrument")]
    Timeout,
    #[error("cancelled")]
    Cancelled,
}

/// Shared flag that aborts blocking scans and polls.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ProtocolError::Cancelled.into())
        } else {
            Ok(())
        }
    }
}

/// Bounds applied to every exchange with the instrument.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkConfig {
    /// Deadline for one reply frame, start-marker scan included.
    pub read_timeout: Duration,
    /// Bytes skipped while looking for a start marker before giving up.
    pub max_scan_bytes: usize,
    /// Pause between result queries while a test is running.
    pub poll_interval: Duration,
    /// Overall bound on waiting for a running test.
    pub poll_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(2),
            max_scan_bytes: 1024,
            poll_interval: Duration::from_millis(100),
            poll_timeout: Duration::from_secs(600),
        }
    }
}

impl LinkConfig {
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_max_scan_bytes(mut self, count: usize) -> Self {
        self.max_scan_bytes = count;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }
}
