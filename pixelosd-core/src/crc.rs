//! CRC-8-DVB-S2 (frame trailer) and CRC-32-IEEE (VM program integrity header).
//!
//! Both are instances of well-known algorithms already cataloged by the
//! `crc` crate, so we reuse its incremental `Digest` API instead of
//! hand-rolling the bit loops.

use crc::{Crc, Digest, CRC_32_ISO_HDLC, CRC_8_DVB_S2};

static CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_DVB_S2);
static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub fn crc8(bytes: &[u8]) -> u8 {
	CRC8.checksum(bytes)
}

pub fn crc32(bytes: &[u8]) -> u32 {
	CRC32.checksum(bytes)
}

/// An incremental CRC-8-DVB-S2 accumulator, used by the framer to fold in
/// the length bytes and payload bytes without an intermediate allocation.
pub struct Crc8Digest<'a>(Digest<'a, u8>);

impl<'a> Crc8Digest<'a> {
	pub fn new() -> Self {
		Crc8Digest(CRC8.digest())
	}

	pub fn update(&mut self, bytes: &[u8]) {
		self.0.update(bytes);
	}

	pub fn finalize(self) -> u8 {
		self.0.finalize()
	}
}

impl<'a> Default for Crc8Digest<'a> {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn crc8_vectors() {
		assert_eq!(crc8(&[]), 0x00);
		assert_eq!(crc8(&[0x00]), 0x00);
		assert_eq!(crc8(&[0x01]), 0xD5);
		assert_eq!(crc8(&[0xFF]), 0xB2);
		assert_eq!(crc8(b"123456789"), 0xBC);
	}

	#[test]
	fn crc8_incremental_matches_oneshot() {
		let mut d = Crc8Digest::new();
		d.update(b"1234");
		d.update(b"56789");
		assert_eq!(d.finalize(), crc8(b"123456789"));
	}
}
