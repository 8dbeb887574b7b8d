use log::debug;
use std::io::{Read, Write};

use super::{
    frame, CancelToken, LinkConfig, Opcode, ProtocolError, Result, CONTROLLER_ADDRESS,
    INSTRUMENT_ADDRESS,
};

/// Half-duplex command channel to one instrument.
///
/// Exactly one command is outstanding at a time: every `send` is followed by
/// reading the matching reply before anything else goes out.
pub struct Link<T> {
    port: T,
    own: u8,
    peer: u8,
    config: LinkConfig,
    cancel: CancelToken,
}

impl<T> Link<T>
where
    T: Read + Write,
{
    pub fn new(port: T, config: LinkConfig, cancel: CancelToken) -> Self {
        Self {
            port,
            own: CONTROLLER_ADDRESS,
            peer: INSTRUMENT_ADDRESS,
            config,
            cancel,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn into_inner(self) -> T {
        self.port
    }

    pub fn send(&mut self, opcode: Opcode, params: &[u8]) -> Result<()> {
        let buffer = frame::encode(self.peer, self.own, opcode_byte(opcode), params);
        debug!("send {:?} {:02X?}", opcode, buffer.as_slice());
        self.port.write_all(&buffer)?;
        self.port.flush()?;
        Ok(())
    }

    pub fn receive(&mut self) -> Result<Vec<u8>> {
        frame::decode(
            &mut self.port,
            self.own,
            self.peer,
            &self.config,
            &self.cancel,
        )
    }

    /// Sends a command whose reply starts with the same opcode and returns
    /// the bytes following the echoed opcode.
    pub fn send_receive_commandecho(&mut self, opcode: Opcode, params: &[u8]) -> Result<Vec<u8>> {
        self.send(opcode, params)?;
        let mut payload = self.receive()?;

        let expected = opcode_byte(opcode);
        match payload.first().copied() {
            None => Err(ProtocolError::Truncated { needed: 1, got: 0 }.into()),
            Some(received) if received != expected => {
                Err(ProtocolError::Sync { expected, received }.into())
            }
            Some(_) => Ok(payload.split_off(1)),
        }
    }

    /// Reads a generic acknowledgement frame and maps its status byte.
    pub fn check_reply(&mut self) -> Result<()> {
        let payload = self.receive()?;
        check_ack(&payload)
    }

    /// Sends a write-style command and waits for its acknowledgement.
    pub fn execute(&mut self, opcode: Opcode, params: &[u8]) -> Result<()> {
        self.send(opcode, params)?;
        self.check_reply()
    }
}

fn opcode_byte(opcode: Opcode) -> u8 {
    opcode as u8
}

fn check_ack(payload: &[u8]) -> Result<()> {
    let leader = opcode_byte(Opcode::Reply);

    match payload {
        [] => Err(ProtocolError::Truncated { needed: 2, got: 0 }.into()),
        [first, ..] if *first != leader => Err(ProtocolError::Sync {
            expected: leader,
            received: *first,
        }
        .into()),
        [_] => Err(ProtocolError::Truncated { needed: 2, got: 1 }.into()),
        [_, 0, ..] => Ok(()),
        [_, 1, ..] => Err(ProtocolError::Command.into()),
        [_, 2, ..] => Err(ProtocolError::Parameter.into()),
        [_, status, ..] => Err(ProtocolError::UnknownReply(*status).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode;
    use std::io::{self, Cursor};

    struct Scripted {
        written: Vec<u8>,
        replies: Cursor<Vec<u8>>,
    }

    impl Scripted {
        fn replying(frames: &[Vec<u8>]) -> Self {
            Self {
                written: Vec::new(),
                replies: Cursor::new(frames.concat()),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.replies.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn reply(opcode: u8, params: &[u8]) -> Vec<u8> {
        encode(CONTROLLER_ADDRESS, INSTRUMENT_ADDRESS, opcode, params)
    }

    fn link(frames: &[Vec<u8>]) -> Link<Scripted> {
        Link::new(
            Scripted::replying(frames),
            LinkConfig::default(),
            CancelToken::new(),
        )
    }

    fn kind(err: anyhow::Error) -> ProtocolError {
        err.downcast::<ProtocolError>().expect("protocol error")
    }

    #[test]
    fn echo_returns_tail() {
        let mut link = link(&[reply(0x90, b"Chroma,19073")]);
        let tail = link.send_receive_commandecho(Opcode::Identify, &[]).unwrap();
        assert_eq!(tail, b"Chroma,19073".to_vec());

        let port = link.into_inner();
        assert_eq!(
            port.written,
            encode(INSTRUMENT_ADDRESS, CONTROLLER_ADDRESS, 0x90, &[])
        );
    }

    #[test]
    fn echo_mismatch_is_sync_error() {
        let mut link = link(&[reply(0x7F, &[0])]);
        let err = link
            .send_receive_commandecho(Opcode::Identify, &[])
            .unwrap_err();
        assert_eq!(
            kind(err),
            ProtocolError::Sync {
                expected: 0x90,
                received: 0x7F
            }
        );
    }

    #[test]
    fn ack_status_codes() {
        assert!(link(&[reply(0x7F, &[0])]).check_reply().is_ok());
        assert_eq!(
            kind(link(&[reply(0x7F, &[1])]).check_reply().unwrap_err()),
            ProtocolError::Command
        );
        assert_eq!(
            kind(link(&[reply(0x7F, &[2])]).check_reply().unwrap_err()),
            ProtocolError::Parameter
        );
        assert_eq!(
            kind(link(&[reply(0x7F, &[9])]).check_reply().unwrap_err()),
            ProtocolError::UnknownReply(9)
        );
    }

    #[test]
    fn ack_with_wrong_leader_is_sync_error() {
        let err = link(&[reply(0x22, &[0])]).check_reply().unwrap_err();
        assert_eq!(
            kind(err),
            ProtocolError::Sync {
                expected: 0x7F,
                received: 0x22
            }
        );
    }

    #[test]
    fn ack_without_status_is_truncated() {
        let err = link(&[reply(0x7F, &[])]).check_reply().unwrap_err();
        assert_eq!(kind(err), ProtocolError::Truncated { needed: 2, got: 1 });
    }

    #[test]
    fn execute_sends_then_checks() {
        let mut link = link(&[reply(0x7F, &[0])]);
        link.execute(Opcode::Start, &[]).unwrap();
        let port = link.into_inner();
        assert_eq!(port.written[4], 0x22);
    }
}
