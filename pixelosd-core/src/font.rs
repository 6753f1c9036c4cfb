//! MCM font file parsing and per-glyph upload.

use std::io::BufRead;

use log::debug;

use crate::error::Error;
use crate::protocol::Opcode;
use crate::read_write::LittleEndianWriter;
use crate::session::Session;

const MCM_HEADER: &str = "MAX7456";
const GLYPH_BYTES: usize = 64;

/// Parses an MCM font file into its header check plus one bitstream of
/// packed glyph bytes (8 ASCII `'0'`/`'1'` digits per byte).
pub fn parse_mcm(r: impl BufRead) -> Result<Vec<u8>, Error> {
	let mut lines = r.lines();
	let header = lines
		.next()
		.ok_or_else(|| Error::Format("empty MCM file".into()))?
		.map_err(Error::Io)?;
	if header.trim() != MCM_HEADER {
		return Err(Error::Format(format!("expected MCM header {MCM_HEADER:?}, got {header:?}")));
	}

	let mut bits = Vec::new();
	for line in lines {
		let line = line.map_err(Error::Io)?;
		for c in line.chars() {
			match c {
				'0' => bits.push(false),
				'1' => bits.push(true),
				'\r' | '\n' => {}
				other => return Err(Error::Format(format!("unexpected character in MCM bitstream: {other:?}"))),
			}
		}
	}

	if bits.len() % 8 != 0 {
		return Err(Error::Format("MCM bitstream length is not a multiple of 8".into()));
	}

	let mut bytes = Vec::with_capacity(bits.len() / 8);
	for chunk in bits.chunks(8) {
		let mut b = 0u8;
		for (i, &bit) in chunk.iter().enumerate() {
			if bit {
				b |= 1 << (7 - i);
			}
		}
		bytes.push(b);
	}

	if bytes.len() % GLYPH_BYTES != 0 {
		return Err(Error::Format(format!(
			"MCM bitstream yields {} bytes, not a multiple of {GLYPH_BYTES} (one glyph)",
			bytes.len()
		)));
	}

	Ok(bytes)
}

impl Session {
	/// Uploads every glyph parsed from `font_bytes` (see [`parse_mcm`]),
	/// starting at address 0, calling `progress(addr)` after each glyph.
	pub fn upload_font(&mut self, font_bytes: &[u8], mut progress: impl FnMut(u16)) -> Result<(), Error> {
		let glyph_count = font_bytes.len() / GLYPH_BYTES;
		for i in 0..glyph_count {
			let addr = i as u16;
			let glyph = &font_bytes[i * GLYPH_BYTES..(i + 1) * GLYPH_BYTES];
			let mut payload = Vec::with_capacity(2 + GLYPH_BYTES);
			payload.write_val(addr)?;
			payload.extend_from_slice(glyph);
			self.send_sync_opcode(Opcode::WriteFont, &payload)?;
			debug!("uploaded glyph {addr}/{glyph_count}");
			progress(addr);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[test]
	fn parses_one_glyph() {
		let mut text = String::from("MAX7456\n");
		for _ in 0..GLYPH_BYTES {
			text.push_str("00000001");
		}
		let bytes = parse_mcm(Cursor::new(text)).unwrap();
		assert_eq!(bytes.len(), GLYPH_BYTES);
		assert!(bytes.iter().all(|&b| b == 0x01));
	}

	#[test]
	fn rejects_missing_header() {
		let text = "NOT7456\n00000000";
		assert!(parse_mcm(Cursor::new(text)).is_err());
	}

	#[test]
	fn rejects_partial_glyph() {
		let text = format!("MAX7456\n{}", "0".repeat(8 * 3));
		assert!(matches!(parse_mcm(Cursor::new(text)), Err(Error::Format(_))));
	}
}
