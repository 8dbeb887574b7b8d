use log::{debug, info};
use std::io::{Read, Write};
use std::thread;
use std::time::Instant;

use crate::protocol::{
    CancelToken, Link, LinkConfig, Opcode, ProtocolError, Result, RESULT_SENTINEL,
};
use crate::results::{decode_result, Measurement, Model, ResultCode};
use crate::steps::{AcStep, DcStep};

/// Where the instrument is in its test lifecycle, as far as this session
/// has driven it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Identified,
    /// At least one step has been programmed since the last clear.
    Armed,
    Running,
    Stopped,
    Finished(ResultCode),
}

/// Exclusive connection to one instrument.
pub struct Session<T> {
    link: Link<T>,
    model: Model,
    state: SessionState,
    identity: Option<String>,
}

impl<T> Session<T>
where
    T: Read + Write,
{
    pub fn new(port: T, model: Model) -> Self {
        Self::with_config(port, model, LinkConfig::default(), CancelToken::new())
    }

    pub fn with_config(port: T, model: Model, config: LinkConfig, cancel: CancelToken) -> Self {
        Self {
            link: Link::new(port, config, cancel),
            model,
            state: SessionState::Connected,
            identity: None,
        }
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.link.cancel_token().clone()
    }

    /// Ends the session and hands back the transport.
    pub fn into_inner(self) -> T {
        self.link.into_inner()
    }

    /// Queries the instrument's identification string.
    pub fn identify(&mut self) -> Result<String> {
        let tail = self.link.send_receive_commandecho(Opcode::Identify, &[])?;
        let identity = String::from_utf8(tail)?.trim_end().to_string();
        info!("identified {:?}", identity);

        if matches!(self.state, SessionState::Connected) {
            self.state = SessionState::Identified;
        }
        self.identity = Some(identity.clone());
        Ok(identity)
    }

    pub fn start(&mut self) -> Result<()> {
        self.link.execute(Opcode::Start, &[])?;
        info!("test started");
        self.state = SessionState::Running;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.link.execute(Opcode::Stop, &[])?;
        info!("test stopped");
        self.state = SessionState::Stopped;
        Ok(())
    }

    pub fn clear_steps(&mut self) -> Result<()> {
        self.link.execute(Opcode::ClearSteps, &[])?;
        info!("steps cleared");
        self.state = if self.identity.is_some() {
            SessionState::Identified
        } else {
            SessionState::Connected
        };
        Ok(())
    }

    pub fn program_ac(&mut self, step: &AcStep) -> Result<()> {
        let record = step.encode()?;
        self.link.execute(Opcode::ProgramStep, &record)?;
        info!("programmed AC step {}", step.step);
        self.state = SessionState::Armed;
        Ok(())
    }

    pub fn program_dc(&mut self, step: &DcStep) -> Result<()> {
        let record = step.encode()?;
        self.link.execute(Opcode::ProgramStep, &record)?;
        info!("programmed DC step {}", step.step);
        self.state = SessionState::Armed;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_step_parameter_ac(
        &mut self,
        step: u8,
        voltage: u16,
        ramp_s: f64,
        test_s: f64,
        fall_s: f64,
        high_limit_a: f64,
        low_limit_a: f64,
        arc_limit_a: f64,
    ) -> Result<()> {
        self.program_ac(&AcStep {
            step,
            voltage,
            ramp_time: ramp_s,
            test_time: test_s,
            fall_time: fall_s,
            high_limit: high_limit_a,
            low_limit: low_limit_a,
            arc_limit: arc_limit_a,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_step_parameter_dc(
        &mut self,
        step: u8,
        voltage: u16,
        ramp_s: f64,
        dwell_s: f64,
        test_s: f64,
        fall_s: f64,
        high_limit_a: f64,
        low_limit_a: f64,
        arc_limit_a: f64,
        inrush_enabled: bool,
    ) -> Result<()> {
        self.program_dc(&DcStep {
            step,
            voltage,
            ramp_time: ramp_s,
            dwell_time: dwell_s,
            test_time: test_s,
            fall_time: fall_s,
            high_limit: high_limit_a,
            low_limit: low_limit_a,
            arc_limit: arc_limit_a,
            inrush: inrush_enabled,
        })
    }

    /// Result of `step`; step 0 is the current or most recent one.
    pub fn get_result(&mut self, step: u8) -> Result<Measurement> {
        let tail = self
            .link
            .send_receive_commandecho(Opcode::QueryResult, &[step, RESULT_SENTINEL])?;
        decode_result(&tail, self.model)
    }

    /// Polls until the running test leaves `TESTING`, then fetches every
    /// step up to the last one reported, in order.
    ///
    /// Fails with `ProtocolError::Timeout` once `poll_timeout` has elapsed
    /// and with `ProtocolError::Cancelled` when the cancel token fires.
    pub fn wait_and_return_results(&mut self) -> Result<Vec<Measurement>> {
        let config = self.link.config().clone();
        let cancel = self.link.cancel_token().clone();
        let deadline = Instant::now() + config.poll_timeout;

        let last = loop {
            cancel.check()?;
            let current = self.get_result(0)?;
            if current.result_code.is_terminal() {
                break current;
            }

            debug!("step {} still testing", current.step);
            if Instant::now() >= deadline {
                return Err(ProtocolError::Timeout.into());
            }
            thread::sleep(config.poll_interval);
        };

        info!("test finished: {} at step {}", last.result_code, last.step);
        self.state = SessionState::Finished(last.result_code);

        (1..=last.step).map(|step| self.get_result(step)).collect()
    }
}
