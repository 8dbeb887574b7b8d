//! Binary records for programming test steps.
use crate::protocol::{ProtocolError, Result};
use crate::results::Mode;

/// Size of a step record on the wire.
pub const STEP_RECORD_LEN: usize = 28;

/// Inrush word value that enables inrush checking on a DC step.
const INRUSH_ENABLED: u32 = 10_000;

/// Counts per second of the time fields.
const TIME_SCALE: f64 = 10.0;
/// Counts per ampere of the limit fields.
const CURRENT_SCALE: f64 = 1e7;

/// AC withstand step. Times in seconds, limits in amperes.
#[derive(Debug, Clone, PartialEq)]
pub struct AcStep {
    pub step: u8,
    pub voltage: u16,
    pub ramp_time: f64,
    pub test_time: f64,
    pub fall_time: f64,
    pub high_limit: f64,
    pub low_limit: f64,
    pub arc_limit: f64,
}

/// DC withstand step. Times in seconds, limits in amperes.
#[derive(Debug, Clone, PartialEq)]
pub struct DcStep {
    pub step: u8,
    pub voltage: u16,
    pub ramp_time: f64,
    pub dwell_time: f64,
    pub test_time: f64,
    pub fall_time: f64,
    pub high_limit: f64,
    pub low_limit: f64,
    pub arc_limit: f64,
    pub inrush: bool,
}

struct StepRecord {
    step: u8,
    mode: Mode,
    voltage: u16,
    ramp_time: u16,
    dwell_time: u16,
    test_time: u16,
    fall_time: u16,
    high_limit: u32,
    low_limit: u32,
    arc_limit: u32,
    inrush: u32,
}

impl StepRecord {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(STEP_RECORD_LEN);
        buffer.push(self.step);
        buffer.push(self.mode as u8);
        for half in [
            self.voltage,
            self.ramp_time,
            self.dwell_time,
            self.test_time,
            self.fall_time,
        ] {
            buffer.extend_from_slice(&half.to_le_bytes());
        }
        for word in [self.high_limit, self.low_limit, self.arc_limit, self.inrush] {
            buffer.extend_from_slice(&word.to_le_bytes());
        }
        buffer
    }
}

fn scaled(field: &'static str, value: f64, scale: f64, max: u32) -> Result<u32> {
    let counts = (value * scale).round();
    if !counts.is_finite() || counts < 0.0 || counts > f64::from(max) {
        return Err(ProtocolError::OutOfRange { field, value }.into());
    }
    Ok(counts as u32)
}

fn seconds(field: &'static str, value: f64) -> Result<u16> {
    Ok(scaled(field, value, TIME_SCALE, u32::from(u16::MAX))? as u16)
}

fn amperes(field: &'static str, value: f64) -> Result<u32> {
    scaled(field, value, CURRENT_SCALE, u32::MAX)
}

impl AcStep {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(StepRecord {
            step: self.step,
            mode: Mode::Ac,
            voltage: self.voltage,
            ramp_time: seconds("ramp time", self.ramp_time)?,
            dwell_time: 0,
            test_time: seconds("test time", self.test_time)?,
            fall_time: seconds("fall time", self.fall_time)?,
            high_limit: amperes("high limit", self.high_limit)?,
            low_limit: amperes("low limit", self.low_limit)?,
            arc_limit: amperes("arc limit", self.arc_limit)?,
            inrush: 0,
        }
        .to_bytes())
    }
}

impl DcStep {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(StepRecord {
            step: self.step,
            mode: Mode::Dc,
            voltage: self.voltage,
            ramp_time: seconds("ramp time", self.ramp_time)?,
            dwell_time: seconds("dwell time", self.dwell_time)?,
            test_time: seconds("test time", self.test_time)?,
            fall_time: seconds("fall time", self.fall_time)?,
            high_limit: amperes("high limit", self.high_limit)?,
            low_limit: amperes("low limit", self.low_limit)?,
            arc_limit: amperes("arc limit", self.arc_limit)?,
            inrush: if self.inrush { INRUSH_ENABLED } else { 0 },
        }
        .to_bytes())
    }
}
