//! Chunked firmware flashing, erase, and reboot.

use std::thread::sleep;
use std::time::Duration;

use log::warn;

use crate::error::Error;
use crate::protocol::{Opcode, FLASH_WRITE_END, MAX_TRANSFER_BLOCK_SIZE};
use crate::read_write::LittleEndianWriter;
use crate::response::Response;
use crate::session::Session;
use crate::types::BootloaderCompat;

impl Session {
	pub fn reboot(&mut self) -> Result<(), Error> {
		self.send_fire_and_forget(Opcode::Reboot, &[0])?;
		self.flush()
	}

	pub fn reboot_to_bootloader(&mut self) -> Result<(), Error> {
		self.send_fire_and_forget(Opcode::Reboot, &[1])?;
		self.flush()
	}

	/// Sends one `WRITE_FLASH` chunk. `allow_workaround` gates whether an
	/// `ERROR` response to this particular write may be tolerated under
	/// `BootloaderCompat::CompatBootloader` — the device is only eligible
	/// for the workaround on the last chunk of a transfer and on the
	/// trailing end-of-flash write, never on an earlier chunk.
	fn write_flash_chunk(&mut self, addr: u32, data: &[u8], allow_workaround: bool) -> Result<u32, Error> {
		let mut payload = Vec::with_capacity(4 + data.len());
		payload.write_val(addr)?;
		payload.extend_from_slice(data);

		let result = self.send_sync_opcode(Opcode::WriteFlash, &payload);
		match result {
			Ok(Response::WriteFlashAck { next_addr }) => Ok(next_addr),
			Ok(other) => Err(Error::Protocol(format!("unexpected WRITE_FLASH response: {other:?}"))),
			Err(Error::Remote { request_cmd, error_code })
				if allow_workaround && self.bootloader_compat() == BootloaderCompat::CompatBootloader =>
			{
				warn!(
					"device rejected WRITE_FLASH (cmd {request_cmd}, code {error_code}); \
					 treating as acked under bootloader compatibility mode"
				);
				Ok(addr + data.len() as u32)
			}
			Err(e) => Err(e),
		}
	}

	/// Streams `firmware` in chunks of at most 64 bytes, verifying each
	/// chunk's ack before sending the next, then signals completion and
	/// reboots. If `reboot_to_bootloader_first` is set, the device is sent
	/// to the bootloader before streaming begins.
	pub fn flash_firmware(&mut self, firmware: &[u8], reboot_to_bootloader_first: bool) -> Result<(), Error> {
		if reboot_to_bootloader_first {
			self.reboot_to_bootloader()?;
			sleep(Duration::from_secs(1));
			self.connect(true)?;
		}

		let mut addr = 0u32;
		let mut sent = 0usize;
		for chunk in firmware.chunks(MAX_TRANSFER_BLOCK_SIZE) {
			sent += chunk.len();
			let is_last_chunk = sent == firmware.len();
			let next = self.write_flash_chunk(addr, chunk, is_last_chunk)?;
			let expected = addr + chunk.len() as u32;
			if next != expected {
				return Err(Error::Protocol(format!(
					"WRITE_FLASH ack mismatch: expected next_addr {expected}, got {next}"
				)));
			}
			addr = next;
		}

		self.write_flash_chunk(FLASH_WRITE_END, &[], true)?;
		self.reboot()
	}

	/// Erases firmware: a zero-length write at address 0 (no bootloader
	/// workaround permitted here), then the end marker, then reboot.
	pub fn erase_firmware(&mut self) -> Result<(), Error> {
		let mut payload = Vec::new();
		payload.write_val(0u32)?;
		match self.send_sync_opcode(Opcode::WriteFlash, &payload)? {
			Response::WriteFlashAck { .. } => {}
			other => return Err(Error::Protocol(format!("unexpected WRITE_FLASH response during erase: {other:?}"))),
		}
		let mut end_payload = Vec::new();
		end_payload.write_val(FLASH_WRITE_END)?;
		self.send_sync_opcode(Opcode::WriteFlash, &end_payload)?;
		self.reboot()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::framer::encode_frame;
	use crate::session::SessionOptions;
	use crate::transport::{LoopbackTransport, Transport};

	fn connected_session_with(inbound: Vec<u8>) -> Session {
		let mut info_frame = vec![1u8];
		info_frame.extend(b"AGH");
		info_frame.extend_from_slice(&[2, 0, 0, 16, 30]);
		info_frame.extend_from_slice(&360u16.to_le_bytes());
		info_frame.extend_from_slice(&288u16.to_le_bytes());
		info_frame.push(1);
		info_frame.push(1);
		info_frame.extend_from_slice(&240u16.to_le_bytes());
		info_frame.push(16);

		let mut all_inbound = encode_frame(&info_frame);
		all_inbound.extend(inbound);
		let lb: Box<dyn Transport> = Box::new(LoopbackTransport::with_inbound(all_inbound));
		let mut s = Session::new(lb, 115200, SessionOptions::default());
		s.connect(false).unwrap();
		s
	}

	fn ack_frame(next_addr: u32) -> Vec<u8> {
		let mut payload = vec![121u8];
		payload.extend_from_slice(&next_addr.to_le_bytes());
		encode_frame(&payload)
	}

	#[test]
	fn flashes_two_chunks_then_reboots() {
		let firmware = vec![0xAAu8; 80];
		let mut inbound = Vec::new();
		inbound.extend(ack_frame(64));
		inbound.extend(ack_frame(80));
		inbound.extend(ack_frame(FLASH_WRITE_END));
		let mut s = connected_session_with(inbound);
		s.flash_firmware(&firmware, false).unwrap();
	}

	#[test]
	fn ack_mismatch_is_protocol_error() {
		let firmware = vec![0xAAu8; 10];
		let inbound = ack_frame(999);
		let mut s = connected_session_with(inbound);
		assert!(matches!(s.flash_firmware(&firmware, false), Err(Error::Protocol(_))));
	}
}
