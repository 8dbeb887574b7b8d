use log::{debug, warn};
use std::io::{self, Read};
use std::time::Instant;

use super::{CancelToken, LinkConfig, ProtocolError, Result, START_MARKER};

/// Two's complement of the byte sum, so that a valid frame body plus its
/// checksum sums to zero modulo 256.
pub fn checksum<'a, I>(bytes: I) -> u8
where
    I: IntoIterator<Item = &'a u8>,
{
    0u8.wrapping_sub(
        bytes
            .into_iter()
            .cloned()
            .fold(0u8, |x, y| x.overflowing_add(y).0),
    )
}

/// Builds `[AB, dest, src, len, opcode, params.., checksum]`.
pub fn encode(dest: u8, src: u8, opcode: u8, params: &[u8]) -> Vec<u8> {
    assert!(params.len() < 0xFF);
    let length = (1 + params.len()) as u8;

    let mut buffer = Vec::with_capacity(params.len() + 6);
    buffer.extend_from_slice(&[START_MARKER, dest, src, length, opcode]);
    buffer.extend_from_slice(params);
    buffer.push(checksum(&buffer[1..]));
    buffer
}

/// Reads one frame addressed to `own` from `peer` and returns its payload
/// (opcode followed by parameters).
///
/// Bytes preceding the start marker are discarded, up to
/// `config.max_scan_bytes`. The whole frame must arrive within
/// `config.read_timeout`.
pub fn decode<R>(
    port: &mut R,
    own: u8,
    peer: u8,
    config: &LinkConfig,
    cancel: &CancelToken,
) -> Result<Vec<u8>>
where
    R: Read + ?Sized,
{
    let deadline = Instant::now() + config.read_timeout;
    let mut byte = [0u8; 1];
    let mut skipped = 0usize;

    loop {
        cancel.check()?;
        read_exact_until(port, &mut byte, deadline, cancel)?;
        if byte[0] == START_MARKER {
            break;
        }
        skipped += 1;
        if skipped > config.max_scan_bytes {
            return Err(ProtocolError::MissingStartMarker(config.max_scan_bytes).into());
        }
    }

    if skipped > 0 {
        warn!("discarded {} bytes before start marker", skipped);
    }

    let mut header = [0u8; 3];
    read_exact_until(port, &mut header, deadline, cancel)?;
    let [dest, src, length] = header;

    let mut payload = vec![0u8; length as usize];
    read_exact_until(port, &mut payload, deadline, cancel)?;
    read_exact_until(port, &mut byte, deadline, cancel)?;
    let received = byte[0];

    debug!(
        "recv {:02X?} {:02X?} {:02X}",
        &header,
        payload.as_slice(),
        received
    );

    if dest != own || src != peer {
        return Err(ProtocolError::Framing { dest, src }.into());
    }

    let computed = checksum(header.iter().chain(payload.iter()));
    if computed != received {
        return Err(ProtocolError::Checksum { computed, received }.into());
    }

    Ok(payload)
}

/// `read_exact` that tolerates transport read timeouts until `deadline`.
fn read_exact_until<R>(
    port: &mut R,
    buf: &mut [u8],
    deadline: Instant,
    cancel: &CancelToken,
) -> Result<()>
where
    R: Read + ?Sized,
{
    let mut filled = 0;

    while filled < buf.len() {
        match port.read(&mut buf[filled..]) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            Ok(n) => filled += n,
            Err(e) => match e.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                    cancel.check()?;
                    if Instant::now() >= deadline {
                        return Err(ProtocolError::Timeout.into());
                    }
                }
                _ => return Err(e.into()),
            },
        }
    }

    Ok(())
}
