//! Decoding of the instrument's per-step result records.
mod items;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::fmt::Display;

use crate::protocol::{ProtocolError, Result, RESULT_SENTINEL};

pub use items::{flag, Item, ItemSize, Model, ModelError};

/// Amperes per count of a current reading.
pub const CURRENT_LSB: f64 = 100e-9;
/// Seconds per count of a time reading.
pub const TIME_LSB: f64 = 100e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum ResultCode {
    AcHighFail = 0x11,
    AcLowFail = 0x12,
    AcArcFail = 0x13,
    AcIoFail = 0x14,
    AcNoOutput = 0x15,
    AcVoltOver = 0x16,
    AcCurrentOver = 0x17,

    DcHighFail = 0x21,
    DcLowFail = 0x22,
    DcArcFail = 0x23,
    DcIoFail = 0x24,
    DcNoOutput = 0x25,
    DcVoltOver = 0x26,
    DcCurrentOver = 0x27,
    DcInrushFail = 0x28,

    OsShortFail = 0x61,
    OsOpenFail = 0x62,
    OsIoFail = 0x64,
    OsVoltOver = 0x66,
    OsCurrentOver = 0x67,

    Stop = 0x70,
    UserInterrupt = 0x71,
    CannotTest = 0x72,
    Testing = 0x73,
    Pass = 0x74,
    Skipped = 0x75,
    GfiTripped = 0x79,
    SlaveFailed = 0x7A,
    CsShortFail = 0x7B,
}

impl ResultCode {
    pub fn from_byte(byte: u8) -> Result<Self> {
        ResultCode::from_u8(byte).ok_or_else(|| ProtocolError::UnknownResultCode(byte).into())
    }

    /// Label shown by the instrument's front panel.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::AcHighFail => "AC HIGH FAIL",
            ResultCode::AcLowFail => "AC LOW FAIL",
            ResultCode::AcArcFail => "AC ARC FAIL",
            ResultCode::AcIoFail => "AC I/O FAIL",
            ResultCode::AcNoOutput => "AC NO OUTPUT",
            ResultCode::AcVoltOver => "AC VOLT OVER",
            ResultCode::AcCurrentOver => "AC CURRENT OVER",
            ResultCode::DcHighFail => "DC HIGH FAIL",
            ResultCode::DcLowFail => "DC LOW FAIL",
            ResultCode::DcArcFail => "DC ARC FAIL",
            ResultCode::DcIoFail => "DC I/O FAIL",
            ResultCode::DcNoOutput => "DC NO OUTPUT",
            ResultCode::DcVoltOver => "DC VOLT OVER",
            ResultCode::DcCurrentOver => "DC CURRENT OVER",
            ResultCode::DcInrushFail => "DC INRUSH FAIL",
            ResultCode::OsShortFail => "OS SHORT FAIL",
            ResultCode::OsOpenFail => "OS OPEN FAIL",
            ResultCode::OsIoFail => "OS I/O FAIL",
            ResultCode::OsVoltOver => "OS VOLT OVER",
            ResultCode::OsCurrentOver => "OS CURRENT OVER",
            ResultCode::Stop => "STOP",
            ResultCode::UserInterrupt => "USER INTERRUPT",
            ResultCode::CannotTest => "CANNOT TEST",
            ResultCode::Testing => "TESTING",
            ResultCode::Pass => "PASS",
            ResultCode::Skipped => "SKIPPED",
            ResultCode::GfiTripped => "GFI TRIPPED",
            ResultCode::SlaveFailed => "SLAVE FAILED",
            ResultCode::CsShortFail => "Cs/SHORT FAIL",
        }
    }

    /// Anything but `Testing` ends a run.
    pub fn is_terminal(&self) -> bool {
        *self != ResultCode::Testing
    }
}

impl Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum Mode {
    Ac = 1,
    Dc = 2,
    Ir = 3,
    Gc = 4,
    Pa = 5,
    Os = 6,
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Ac => "AC",
            Mode::Dc => "DC",
            Mode::Ir => "IR",
            Mode::Gc => "GC",
            Mode::Pa => "PA",
            Mode::Os => "OS",
        }
        .fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcReadings {
    pub voltage: u32,
    /// Amperes.
    pub current: f64,
    /// Seconds.
    pub ramp_time: f64,
    pub test_time: f64,
    pub fall_time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DcReadings {
    pub voltage: u32,
    pub current: f64,
    /// Only reported by models whose item table carries an inrush item.
    pub inrush: Option<f64>,
    pub ramp_time: f64,
    /// Only reported by models whose item table carries a dwell item.
    pub dwell_time: Option<f64>,
    pub test_time: f64,
    pub fall_time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OsReadings {
    pub voltage: u32,
    pub capacitance_pf: u32,
    pub test_time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Readings {
    Ac(AcReadings),
    Dc(DcReadings),
    /// Ground continuity steps carry no numeric fields.
    Gc,
    Os(OsReadings),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub step: u8,
    pub result_code: ResultCode,
    pub mode: Mode,
    pub readings: Readings,
}

/// Decodes the bytes following the echoed opcode of a result query.
///
/// Layout: a reserved "new test" byte, the step number, the result code,
/// the `0xD7` sentinel, then a result block whose first byte is the mode.
pub fn decode_result(tail: &[u8], model: Model) -> Result<Measurement> {
    if tail.len() < 5 {
        return Err(ProtocolError::Truncated {
            needed: 5,
            got: tail.len(),
        }
        .into());
    }

    let step = tail[1];
    let result_code = ResultCode::from_byte(tail[2])?;
    if tail[3] != RESULT_SENTINEL {
        return Err(ProtocolError::BadSentinel(tail[3]).into());
    }

    let block = Block {
        data: &tail[4..],
        model,
    };
    let mode_byte = tail[4];
    let mode = Mode::from_u8(mode_byte).ok_or(ProtocolError::UnknownMode(mode_byte))?;

    let readings = match mode {
        Mode::Ac => Readings::Ac(AcReadings {
            voltage: block.required(flag::VOLTAGE, mode)?,
            current: block.current(flag::CURRENT, mode)?,
            ramp_time: block.time(flag::RAMP_TIME, mode)?,
            test_time: block.time(flag::TEST_TIME, mode)?,
            fall_time: block.time(flag::FALL_TIME, mode)?,
        }),
        Mode::Dc => Readings::Dc(DcReadings {
            voltage: block.required(flag::VOLTAGE, mode)?,
            current: block.current(flag::CURRENT, mode)?,
            inrush: block
                .optional(flag::INRUSH)?
                .map(|raw| f64::from(raw) * CURRENT_LSB),
            ramp_time: block.time(flag::RAMP_TIME, mode)?,
            dwell_time: block
                .optional(flag::DWELL_TIME)?
                .map(|raw| f64::from(raw) * TIME_LSB),
            test_time: block.time(flag::TEST_TIME, mode)?,
            fall_time: block.time(flag::FALL_TIME, mode)?,
        }),
        Mode::Os => Readings::Os(OsReadings {
            voltage: block.required(flag::VOLTAGE, mode)?,
            capacitance_pf: block.required(flag::CURRENT, mode)?,
            test_time: block.time(flag::TEST_TIME, mode)?,
        }),
        Mode::Gc => Readings::Gc,
        Mode::Ir | Mode::Pa => return Err(ProtocolError::NotSupported(mode).into()),
    };

    Ok(Measurement {
        step,
        result_code,
        mode,
        readings,
    })
}

struct Block<'a> {
    data: &'a [u8],
    model: Model,
}

impl<'a> Block<'a> {
    fn optional(&self, flag: u8) -> Result<Option<u32>> {
        self.model
            .item(flag)
            .map(|item| item.read(self.data))
            .transpose()
    }

    fn required(&self, flag: u8, mode: Mode) -> Result<u32> {
        self.optional(flag)?
            .ok_or_else(|| ProtocolError::NotSupported(mode).into())
    }

    fn current(&self, flag: u8, mode: Mode) -> Result<f64> {
        Ok(f64::from(self.required(flag, mode)?) * CURRENT_LSB)
    }

    fn time(&self, flag: u8, mode: Mode) -> Result<f64> {
        Ok(f64::from(self.required(flag, mode)?) * TIME_LSB)
    }
}
