//! Encoding and decoding of `$A <varint len> <payload> <crc8>` frames.

use crate::crc::Crc8Digest;
use crate::error::Error;
use crate::protocol::{MARKER_SCAN_LIMIT, MAX_FRAME_LENGTH};
use crate::read_write::{decode_varint, encode_varint};
use crate::transport::Transport;

/// Builds the bytes for one outbound frame around `payload`.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
	let len = encode_varint(payload.len() as u32);

	let mut crc = Crc8Digest::new();
	crc.update(&len);
	crc.update(payload);
	let crc = crc.finalize();

	let mut out = Vec::with_capacity(2 + len.len() + payload.len() + 1);
	out.push(b'$');
	out.push(b'A');
	out.extend_from_slice(&len);
	out.extend_from_slice(payload);
	out.push(crc);
	out
}

/// Reads one frame from `transport`, scanning for the `$A` marker pair and
/// validating length and CRC. Returns the frame's payload.
pub fn read_frame(transport: &mut dyn Transport) -> Result<Vec<u8>, Error> {
	let mut found = false;
	for _ in 0..MARKER_SCAN_LIMIT {
		if transport.read_one_byte()? == b'$' {
			found = true;
			break;
		}
	}
	if !found {
		return Err(Error::Framing("no frame marker within scan limit".into()));
	}
	if transport.read_one_byte()? != b'A' {
		return Err(Error::Framing("expected 'A' after '$' marker".into()));
	}

	let mut reader = ByteReader { transport };
	let len = decode_varint(&mut reader)?;
	if len > MAX_FRAME_LENGTH {
		return Err(Error::Framing(format!("frame length {len} exceeds ceiling {MAX_FRAME_LENGTH}")));
	}

	let len_bytes = encode_varint(len);
	let mut payload = vec![0u8; len as usize];
	for b in payload.iter_mut() {
		*b = transport.read_one_byte()?;
	}
	let crc_byte = transport.read_one_byte()?;

	let mut crc = Crc8Digest::new();
	crc.update(&len_bytes);
	crc.update(&payload);
	let expected = crc.finalize();
	if expected != crc_byte {
		return Err(Error::Framing(format!("CRC mismatch: expected {expected:#04x}, got {crc_byte:#04x}")));
	}

	Ok(payload)
}

/// Adapts a `&mut dyn Transport`'s one-byte-at-a-time reads to `io::Read`
/// so `decode_varint` can be reused without a second code path.
struct ByteReader<'a> {
	transport: &'a mut dyn Transport,
}

impl<'a> std::io::Read for ByteReader<'a> {
	fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
		if buf.is_empty() {
			return Ok(0);
		}
		buf[0] = self
			.transport
			.read_one_byte()
			.map_err(|_| std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "transport read failed"))?;
		Ok(1)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::transport::LoopbackTransport;

	#[test]
	fn round_trip() {
		let payload = vec![1u8, 2, 3, 4, 5];
		let frame = encode_frame(&payload);
		let mut lb = LoopbackTransport::with_inbound(frame);
		let decoded = read_frame(&mut lb).unwrap();
		assert_eq!(decoded, payload);
	}

	#[test]
	fn empty_payload_round_trips() {
		let frame = encode_frame(&[]);
		assert_eq!(frame, vec![b'$', b'A', 0x00, 0x00]);
		let mut lb = LoopbackTransport::with_inbound(frame);
		assert_eq!(read_frame(&mut lb).unwrap(), Vec::<u8>::new());
	}

	#[test]
	fn crc_mismatch_is_framing_error() {
		let mut frame = encode_frame(&[1, 2, 3]);
		let last = frame.len() - 1;
		frame[last] ^= 0xFF;
		let mut lb = LoopbackTransport::with_inbound(frame);
		assert!(matches!(read_frame(&mut lb), Err(Error::Framing(_))));
	}

	#[test]
	fn marker_scan_skips_noise() {
		let mut noisy = vec![0xAAu8; 10];
		noisy.extend(encode_frame(&[9, 9]));
		let mut lb = LoopbackTransport::with_inbound(noisy);
		assert_eq!(read_frame(&mut lb).unwrap(), vec![9, 9]);
	}
}
