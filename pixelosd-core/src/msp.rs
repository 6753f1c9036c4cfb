//! MSP passthrough: bootstraps through a flight-controller bridge acting as
//! a transparent serial relay to the OSD co-processor.

use std::thread::sleep;
use std::time::Duration;

use log::debug;

use crate::error::Error;
use crate::transport::Transport;

const MSP_FC_VARIANT: u8 = 2;
const MSP_SET_PASSTHROUGH: u8 = 245;

fn send_msp_request(transport: &mut dyn Transport, cmd: u8, payload: &[u8]) -> Result<(), Error> {
	let size = payload.len() as u8;
	let mut crc = size ^ cmd;
	for &b in payload {
		crc ^= b;
	}
	let mut frame = vec![b'$', b'M', b'<', size, cmd];
	frame.extend_from_slice(payload);
	frame.push(crc);
	transport.write(&frame)
}

/// Reads one MSP response frame and validates it against `cmd`, the command
/// byte of the request it answers. Both the echoed command and the XOR CRC
/// over size/cmd/payload must match, or the bridge is returning garbage or
/// an answer to some other in-flight request.
fn read_msp_response(transport: &mut dyn Transport, cmd: u8) -> Result<Vec<u8>, Error> {
	loop {
		if transport.read_one_byte()? != b'$' {
			continue;
		}
		if transport.read_one_byte()? != b'M' {
			continue;
		}
		if transport.read_one_byte()? != b'>' {
			continue;
		}
		break;
	}
	let size = transport.read_one_byte()?;
	let resp_cmd = transport.read_one_byte()?;
	if resp_cmd != cmd {
		return Err(Error::Protocol(format!("invalid MSP response cmd {resp_cmd}, expecting {cmd}")));
	}

	let mut crc = size ^ resp_cmd;
	let mut payload = vec![0u8; size as usize];
	for b in payload.iter_mut() {
		*b = transport.read_one_byte()?;
		crc ^= *b;
	}

	let recv_crc = transport.read_one_byte()?;
	if recv_crc != crc {
		return Err(Error::Framing(format!("received invalid MSP crc {recv_crc}, expecting {crc}")));
	}
	Ok(payload)
}

/// Negotiates passthrough mode with the bridging flight controller. Returns
/// `Ok(true)` if the bridge accepted passthrough.
pub fn set_passthrough(transport: &mut dyn Transport) -> Result<bool, Error> {
	send_msp_request(transport, MSP_FC_VARIANT, &[])?;
	let variant = read_msp_response(transport, MSP_FC_VARIANT)?;
	let function_id = if variant.len() == 4 && &variant == b"BTFL" { 16 } else { 20 };

	debug!("MSP passthrough: fc variant {:?}, function id {function_id}", String::from_utf8_lossy(&variant));

	send_msp_request(transport, MSP_SET_PASSTHROUGH, &[0xFE, function_id])?;
	let resp = read_msp_response(transport, MSP_SET_PASSTHROUGH)?;
	Ok(resp.first().copied().unwrap_or(0) != 0)
}

/// Escapes back out of passthrough mode with the classic Hayes `+++`/`ATH`
/// sequence, guarded by one-second pauses either side of the guard code.
pub fn stop_passthrough(transport: &mut dyn Transport) -> Result<(), Error> {
	sleep(Duration::from_secs(1));
	transport.write(b"+++")?;
	sleep(Duration::from_secs(1));
	transport.write(b"ATH")?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::transport::LoopbackTransport;

	#[test]
	fn passthrough_accepts_nonzero_first_byte() {
		let mut lb = LoopbackTransport::with_inbound(vec![]);
		lb.push_inbound(b"$M>");
		lb.push_inbound(&[4, 2, b'B', b'T', b'F', b'L', 0]);
		lb.push_inbound(b"$M>");
		lb.push_inbound(&[1, 245, 1, 0]);
		assert!(set_passthrough(&mut lb).unwrap());
	}
}
