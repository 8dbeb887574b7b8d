//! Simulated instrument speaking the controller side of the serial protocol.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};

use chroma_hipot::protocol::{encode, Opcode, CONTROLLER_ADDRESS, INSTRUMENT_ADDRESS};
use num_traits::FromPrimitive;

pub struct SimInstrument {
    pub identity: String,
    /// Status byte of acknowledgement frames.
    pub ack_status: u8,
    /// Replies to "current result" queries; the last one repeats.
    pub live: VecDeque<Vec<u8>>,
    pub steps: HashMap<u8, Vec<u8>>,
    /// Every command received, opcode and parameters.
    pub received: Vec<(u8, Vec<u8>)>,
    pub silent: bool,
    pub corrupt_replies: bool,
    pub garbage_prefix: Vec<u8>,
    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
}

impl SimInstrument {
    pub fn new() -> Self {
        Self {
            identity: "Chroma,19073,0,1.20".to_string(),
            ack_status: 0,
            live: VecDeque::new(),
            steps: HashMap::new(),
            received: Vec::new(),
            silent: false,
            corrupt_replies: false,
            garbage_prefix: Vec::new(),
            inbox: Vec::new(),
            outbox: VecDeque::new(),
        }
    }

    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.received
            .iter()
            .map(|(opcode, params)| encode(INSTRUMENT_ADDRESS, CONTROLLER_ADDRESS, *opcode, params))
            .collect()
    }

    fn reply(&mut self, opcode: u8, params: &[u8]) {
        let mut frame = encode(CONTROLLER_ADDRESS, INSTRUMENT_ADDRESS, opcode, params);
        if self.corrupt_replies {
            frame[4] ^= 0x01;
        }
        self.outbox.extend(self.garbage_prefix.iter());
        self.outbox.extend(frame);
    }

    fn handle(&mut self, opcode: u8, params: Vec<u8>) {
        self.received.push((opcode, params.clone()));
        if self.silent {
            return;
        }

        match Opcode::from_u8(opcode) {
            Some(Opcode::Identify) => {
                let identity = self.identity.clone().into_bytes();
                self.reply(opcode, &identity);
            }
            Some(Opcode::QueryResult) => {
                let tail = match params.first() {
                    Some(0) => {
                        if self.live.len() > 1 {
                            self.live.pop_front()
                        } else {
                            self.live.front().cloned()
                        }
                    }
                    Some(step) => self.steps.get(step).cloned(),
                    None => None,
                };
                match tail {
                    Some(tail) => self.reply(opcode, &tail),
                    None => self.reply(0x7F, &[2]),
                }
            }
            Some(_) => {
                let status = self.ack_status;
                self.reply(0x7F, &[status]);
            }
            None => self.reply(0x7F, &[1]),
        }
    }

    fn process_inbox(&mut self) {
        loop {
            let start = match self.inbox.iter().position(|&b| b == 0xAB) {
                Some(start) => start,
                None => {
                    self.inbox.clear();
                    return;
                }
            };
            self.inbox.drain(..start);

            if self.inbox.len() < 4 {
                return;
            }
            let length = self.inbox[3] as usize;
            let total = 4 + length + 1;
            if self.inbox.len() < total {
                return;
            }

            let frame: Vec<u8> = self.inbox.drain(..total).collect();
            assert_eq!(frame[1], INSTRUMENT_ADDRESS);
            assert_eq!(frame[2], CONTROLLER_ADDRESS);
            let sum = frame[1..]
                .iter()
                .fold(0u8, |acc, &b| acc.wrapping_add(b));
            assert_eq!(sum, 0, "bad checksum from controller");

            self.handle(frame[4], frame[5..total - 1].to_vec());
        }
    }
}

impl Read for SimInstrument {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.outbox.is_empty() {
            return Err(io::ErrorKind::TimedOut.into());
        }
        let n = buf.len().min(self.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimInstrument {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inbox.extend_from_slice(buf);
        self.process_inbox();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Result reply tail in the base model's layout: 1000 V, 1.2345 mA,
/// inrush word spanning ramp 0.5 s and test 3.0 s, fall 0.2 s, dwell 0.7 s.
pub fn result_tail(step: u8, code: u8, mode: u8) -> Vec<u8> {
    vec![
        0x00, step, code, 0xD7, mode, 0xE8, 0x03, 0x39, 0x30, 0x00, 0x00, 0x05, 0x00, 0x1E,
        0x00, 0x02, 0x00, 0x07, 0x00,
    ]
}
