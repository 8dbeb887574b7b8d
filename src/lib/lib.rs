//! Driver for the binary serial protocol of Chroma 19073-family and
//! QuadTech Sentry HiPot testers.
//!
//! A [`Session`] owns the transport, any `Read + Write`, and drives the
//! instrument through identify, step programming, start/stop and result
//! collection. Every failure is reported to the caller; nothing is retried.
pub mod port;
pub mod protocol;
pub mod results;
pub mod session;
pub mod steps;

pub use protocol::{CancelToken, LinkConfig, ProtocolError};
pub use results::{Measurement, Mode, Model, Readings, ResultCode};
pub use session::{Session, SessionState};
pub use steps::{AcStep, DcStep};
