//! The single-threaded, synchronous session: batches fire-and-forget
//! commands, flushes on overflow or transaction commit, and blocks for a
//! response on every synchronous command.

use log::{debug, info, trace, warn};

use crate::error::Error;
use crate::framer::{encode_frame, read_frame};
use crate::protocol::{Opcode, MAX_SEND_BUFFER_SIZE};
use crate::read_write::{encode_varint, LittleEndianWriter};
use crate::response::{self, Response};
use crate::transport::Transport;
use crate::types::{BitmapOpts, BootloaderCompat, Color, DeviceInfo, OutlineFlag, Point, ProfilePoint, Rect, Unit};
use crate::msp;

/// Construction-time knobs for a [`Session`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
	pub trace: bool,
	pub debug: bool,
	pub profile_at: Option<ProfilePoint>,
	pub msp_passthrough: bool,
	pub bootloader_compat: BootloaderCompat,
}

pub struct Session {
	transport: Box<dyn Transport>,
	baud: u32,
	info: Option<DeviceInfo>,
	send_buffer: Vec<u8>,
	trace: bool,
	debug: bool,
	profile_at: Option<ProfilePoint>,
	msp_requested: bool,
	msp_engaged: bool,
	bootloader_compat: BootloaderCompat,
	closed: bool,

	pub(crate) ahi_config_done: std::cell::Cell<bool>,
	pub(crate) sidebar_config_done: [std::cell::Cell<bool>; 2],
	pub(crate) graph_config_done: [std::cell::Cell<bool>; 4],
}

impl Session {
	pub fn new(transport: Box<dyn Transport>, baud: u32, opts: SessionOptions) -> Self {
		Session {
			transport,
			baud,
			info: None,
			send_buffer: Vec::with_capacity(MAX_SEND_BUFFER_SIZE),
			trace: opts.trace,
			debug: opts.debug,
			profile_at: opts.profile_at,
			msp_requested: opts.msp_passthrough,
			msp_engaged: false,
			bootloader_compat: opts.bootloader_compat,
			closed: false,
			ahi_config_done: std::cell::Cell::new(false),
			sidebar_config_done: [std::cell::Cell::new(false), std::cell::Cell::new(false)],
			graph_config_done: Default::default(),
		}
	}

	pub fn info(&self) -> Option<&DeviceInfo> {
		self.info.as_ref()
	}

	pub fn is_connected(&self) -> bool {
		self.info.is_some()
	}

	pub fn speaks_v2(&self) -> bool {
		self.info.map(|i| i.speaks_v2()).unwrap_or(false)
	}

	pub fn bootloader_compat(&self) -> BootloaderCompat {
		self.bootloader_compat
	}

	// ---- low-level dispatch -------------------------------------------------

	fn append_command(&mut self, opcode: Opcode, payload: &[u8]) -> Result<(), Error> {
		let record_len = 1 + payload.len();
		if self.send_buffer.len() + record_len > MAX_SEND_BUFFER_SIZE {
			self.flush()?;
		}
		self.send_buffer.push(opcode.as_u8());
		self.send_buffer.extend_from_slice(payload);
		Ok(())
	}

	pub fn flush(&mut self) -> Result<(), Error> {
		if self.send_buffer.is_empty() {
			return Ok(());
		}
		let frame = encode_frame(&self.send_buffer);
		if self.trace {
			trace!("--> {:02x?}", frame);
		}
		self.transport.write(&frame)?;
		self.send_buffer.clear();
		Ok(())
	}

	fn send_sync(&mut self, opcode: Opcode, payload: &[u8]) -> Result<Response, Error> {
		if self.debug {
			debug!("CMD {:?} =>> {:02x?}", opcode, payload);
		}
		self.append_command(opcode, payload)?;
		self.flush()?;
		let frame = read_frame(self.transport.as_mut())?;
		if self.trace {
			trace!("<-- {:02x?}", frame);
		}
		let resp = response::decode(&frame)?;
		if self.debug {
			debug!("RESP <<= {:?}", resp);
		}
		if let Response::Error { request_cmd, error_code } = resp {
			return Err(Error::Remote { request_cmd, error_code });
		}
		Ok(resp)
	}

	pub(crate) fn send_fire_and_forget(&mut self, opcode: Opcode, payload: &[u8]) -> Result<(), Error> {
		self.append_command(opcode, payload)
	}

	// ---- connection lifecycle ------------------------------------------------

	pub fn connect(&mut self, force: bool) -> Result<(), Error> {
		if self.info.is_some() && !force {
			return Ok(());
		}
		if self.msp_requested && !self.msp_engaged {
			let accepted = msp::set_passthrough(self.transport.as_mut())?;
			if !accepted {
				return Err(Error::Protocol("MSP passthrough request was rejected".into()));
			}
			self.msp_engaged = true;
		}

		match self.send_sync(Opcode::Info, &[])? {
			Response::Info(info) => {
				if info.is_bootloader {
					info!("connected to OSD co-processor in bootloader mode");
				} else {
					info!(
						"connected to OSD co-processor v{}.{}.{}, grid {}x{}, pixels {}x{}",
						info.major, info.minor, info.patch, info.grid_columns, info.grid_rows, info.pixel_width, info.pixel_height
					);
				}
				self.info = Some(info);
				Ok(())
			}
			other => Err(Error::Protocol(format!("expected INFO response on connect, got {other:?}"))),
		}
	}

	pub fn close(&mut self) -> Result<(), Error> {
		if self.closed {
			return Ok(());
		}
		self.flush()?;
		if self.msp_engaged {
			if let Err(e) = msp::stop_passthrough(self.transport.as_mut()) {
				warn!("failed to cleanly exit MSP passthrough: {e}");
			}
		}
		self.transport.close()?;
		self.closed = true;
		Ok(())
	}

	pub fn set_data_rate(&mut self, new_baud: u32) -> Result<(), Error> {
		let mut payload = Vec::new();
		payload.write_val(new_baud)?;
		self.send_sync(Opcode::SetDataRate, &payload)?;
		self.transport.reopen(new_baud)?;
		self.baud = new_baud;
		Ok(())
	}

	pub fn baud(&self) -> u32 {
		self.baud
	}

	pub fn get_active_camera(&mut self) -> Result<u8, Error> {
		match self.send_sync(Opcode::GetActiveCamera, &[])? {
			Response::Other(bytes) if !bytes.is_empty() => Ok(bytes[0]),
			other => Err(Error::Protocol(format!("unexpected GET_ACTIVE_CAMERA response: {other:?}"))),
		}
	}

	// ---- transactions ---------------------------------------------------------

	pub fn transaction_begin(&mut self) -> Result<(), Error> {
		match self.profile_at {
			Some(p) => {
				let mut payload = Vec::new();
				p.write(&mut payload)?;
				self.append_command(Opcode::TransactionBeginProfiled, &payload)
			}
			None => self.append_command(Opcode::TransactionBegin, &[]),
		}
	}

	pub fn transaction_commit(&mut self) -> Result<(), Error> {
		self.append_command(Opcode::TransactionCommit, &[])?;
		self.flush()
	}

	// ---- graphics state ---------------------------------------------------------

	pub fn set_stroke_color(&mut self, c: Color) -> Result<(), Error> {
		self.append_command(Opcode::SetStrokeColor, &[c as u8])
	}

	pub fn set_fill_color(&mut self, c: Color) -> Result<(), Error> {
		self.append_command(Opcode::SetFillColor, &[c as u8])
	}

	pub fn set_stroke_and_fill_color(&mut self, stroke: Color, fill: Color) -> Result<(), Error> {
		self.append_command(Opcode::SetStrokeAndFillColor, &[stroke as u8, fill as u8])
	}

	pub fn set_color_inversion(&mut self, enabled: bool) -> Result<(), Error> {
		self.append_command(Opcode::SetColorInversion, &[enabled as u8])
	}

	pub fn set_pixel(&mut self, p: Point, c: Color) -> Result<(), Error> {
		let mut buf = Vec::new();
		p.write(&mut buf)?;
		buf.push(c as u8);
		self.append_command(Opcode::SetPixel, &buf)
	}

	pub fn set_pixel_to_stroke_color(&mut self, p: Point) -> Result<(), Error> {
		let mut buf = Vec::new();
		p.write(&mut buf)?;
		self.append_command(Opcode::SetPixelToStrokeColor, &buf)
	}

	pub fn set_pixel_to_fill_color(&mut self, p: Point) -> Result<(), Error> {
		let mut buf = Vec::new();
		p.write(&mut buf)?;
		self.append_command(Opcode::SetPixelToFillColor, &buf)
	}

	pub fn set_stroke_width(&mut self, width: u8) -> Result<(), Error> {
		self.append_command(Opcode::SetStrokeWidth, &[width])
	}

	pub fn set_line_outline_type(&mut self, flag: OutlineFlag) -> Result<(), Error> {
		let flag = flag.validated()?;
		self.append_command(Opcode::SetLineOutlineType, &[flag.0])
	}

	pub fn set_line_outline_color(&mut self, c: Color) -> Result<(), Error> {
		self.append_command(Opcode::SetLineOutlineColor, &[c as u8])
	}

	// ---- clipping & primitives ---------------------------------------------------------

	pub fn clip_to_rect(&mut self, r: Rect) -> Result<(), Error> {
		let mut buf = Vec::new();
		r.write(&mut buf)?;
		self.append_command(Opcode::ClipToRect, &buf)
	}

	pub fn clear_screen(&mut self) -> Result<(), Error> {
		self.append_command(Opcode::ClearScreen, &[])
	}

	pub fn clear_rect(&mut self, r: Rect) -> Result<(), Error> {
		let mut buf = Vec::new();
		r.write(&mut buf)?;
		self.append_command(Opcode::ClearRect, &buf)
	}

	pub fn drawing_reset(&mut self) -> Result<(), Error> {
		self.append_command(Opcode::DrawingReset, &[])
	}

	/// Draws a 1-bit-per-pixel bitmap into `rect`, row-major, MSB first per
	/// byte. The reference client never implemented this opcode's body; the
	/// payload shape here follows the same bit convention as font glyphs.
	pub fn draw_bitmap(&mut self, rect: Rect, bitmap: &[u8], mask: bool) -> Result<(), Error> {
		let mut buf = Vec::new();
		rect.write(&mut buf)?;
		buf.extend_from_slice(bitmap);
		let opcode = if mask { Opcode::DrawBitmapMask } else { Opcode::DrawBitmap };
		self.append_command(opcode, &buf)
	}

	pub fn draw_char(&mut self, p: Point, ch: u16, opts: BitmapOpts) -> Result<(), Error> {
		let mut buf = Vec::new();
		p.write(&mut buf)?;
		buf.write_val(ch)?;
		buf.push(opts.bits());
		self.append_command(Opcode::DrawChar, &buf)
	}

	pub fn draw_char_mask(&mut self, p: Point, ch: u16, opts: BitmapOpts, color: Color) -> Result<(), Error> {
		let mut buf = Vec::new();
		p.write(&mut buf)?;
		buf.write_val(ch)?;
		buf.push(opts.bits());
		buf.push(color as u8);
		self.append_command(Opcode::DrawCharMask, &buf)
	}

	pub fn draw_str(&mut self, p: Point, s: &str, opts: BitmapOpts) -> Result<(), Error> {
		let mut buf = Vec::new();
		p.write(&mut buf)?;
		buf.push(opts.bits());
		buf.extend(string_blob(s));
		self.append_command(Opcode::DrawStr, &buf)
	}

	pub fn draw_str_mask(&mut self, p: Point, s: &str, opts: BitmapOpts, color: Color) -> Result<(), Error> {
		let mut buf = Vec::new();
		p.write(&mut buf)?;
		buf.push(opts.bits());
		buf.push(color as u8);
		buf.extend(string_blob(s));
		self.append_command(Opcode::DrawStrMask, &buf)
	}

	pub fn move_to_point(&mut self, p: Point) -> Result<(), Error> {
		let mut buf = Vec::new();
		p.write(&mut buf)?;
		self.append_command(Opcode::MoveToPoint, &buf)
	}

	pub fn stroke_line_to_point(&mut self, p: Point) -> Result<(), Error> {
		let mut buf = Vec::new();
		p.write(&mut buf)?;
		self.append_command(Opcode::StrokeLineToPoint, &buf)
	}

	pub fn stroke_triangle(&mut self, a: Point, b: Point, c: Point) -> Result<(), Error> {
		self.triangle_cmd(Opcode::StrokeTriangle, a, b, c)
	}
	pub fn fill_triangle(&mut self, a: Point, b: Point, c: Point) -> Result<(), Error> {
		self.triangle_cmd(Opcode::FillTriangle, a, b, c)
	}
	pub fn fill_stroke_triangle(&mut self, a: Point, b: Point, c: Point) -> Result<(), Error> {
		self.triangle_cmd(Opcode::FillStrokeTriangle, a, b, c)
	}
	fn triangle_cmd(&mut self, opcode: Opcode, a: Point, b: Point, c: Point) -> Result<(), Error> {
		let mut buf = Vec::new();
		a.write(&mut buf)?;
		b.write(&mut buf)?;
		c.write(&mut buf)?;
		self.append_command(opcode, &buf)
	}

	pub fn stroke_rect(&mut self, r: Rect) -> Result<(), Error> {
		self.rect_cmd(Opcode::StrokeRect, r)
	}
	pub fn fill_rect(&mut self, r: Rect) -> Result<(), Error> {
		self.rect_cmd(Opcode::FillRect, r)
	}
	pub fn fill_stroke_rect(&mut self, r: Rect) -> Result<(), Error> {
		self.rect_cmd(Opcode::FillStrokeRect, r)
	}
	pub fn stroke_ellipse_in_rect(&mut self, r: Rect) -> Result<(), Error> {
		self.rect_cmd(Opcode::StrokeEllipseInRect, r)
	}
	pub fn fill_ellipse_in_rect(&mut self, r: Rect) -> Result<(), Error> {
		self.rect_cmd(Opcode::FillEllipseInRect, r)
	}
	pub fn fill_stroke_ellipse_in_rect(&mut self, r: Rect) -> Result<(), Error> {
		self.rect_cmd(Opcode::FillStrokeEllipseInRect, r)
	}
	fn rect_cmd(&mut self, opcode: Opcode, r: Rect) -> Result<(), Error> {
		let mut buf = Vec::new();
		r.write(&mut buf)?;
		self.append_command(opcode, &buf)
	}

	// ---- CTM (current transform matrix) ---------------------------------------------------------

	pub fn ctm_reset(&mut self) -> Result<(), Error> {
		self.append_command(Opcode::CtmReset, &[])
	}

	pub fn ctm_set(&mut self, a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Result<(), Error> {
		self.ctm_six(Opcode::CtmSet, a, b, c, d, e, f)
	}

	pub fn ctm_multiply(&mut self, a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Result<(), Error> {
		self.ctm_six(Opcode::CtmMultiply, a, b, c, d, e, f)
	}

	fn ctm_six(&mut self, opcode: Opcode, a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Result<(), Error> {
		let mut buf = Vec::new();
		for v in [a, b, c, d, e, f] {
			buf.write_val(v)?;
		}
		self.append_command(opcode, &buf)
	}

	pub fn ctm_translate(&mut self, dx: f32, dy: f32) -> Result<(), Error> {
		self.ctm_two(Opcode::CtmTranslate, dx, dy)
	}
	pub fn ctm_translate_rev(&mut self, dx: f32, dy: f32) -> Result<(), Error> {
		self.ctm_two(Opcode::CtmTranslateRev, dx, dy)
	}
	pub fn ctm_scale(&mut self, sx: f32, sy: f32) -> Result<(), Error> {
		self.ctm_two(Opcode::CtmScale, sx, sy)
	}
	pub fn ctm_shear(&mut self, sx: f32, sy: f32) -> Result<(), Error> {
		self.ctm_two(Opcode::CtmShear, sx, sy)
	}
	fn ctm_two(&mut self, opcode: Opcode, a: f32, b: f32) -> Result<(), Error> {
		let mut buf = Vec::new();
		buf.write_val(a)?;
		buf.write_val(b)?;
		self.append_command(opcode, &buf)
	}

	pub fn ctm_rotate(&mut self, theta: f32) -> Result<(), Error> {
		let mut buf = Vec::new();
		buf.write_val(theta)?;
		self.append_command(Opcode::CtmRotate, &buf)
	}

	pub fn ctm_rotate_about(&mut self, theta: f32, cx: f32, cy: f32) -> Result<(), Error> {
		let mut buf = Vec::new();
		buf.write_val(theta)?;
		buf.write_val(cx)?;
		buf.write_val(cy)?;
		self.append_command(Opcode::CtmRotateAbout, &buf)
	}

	pub fn ctm_shear_about(&mut self, sx: f32, sy: f32, cx: f32, cy: f32) -> Result<(), Error> {
		let mut buf = Vec::new();
		buf.write_val(sx)?;
		buf.write_val(sy)?;
		buf.write_val(cx)?;
		buf.write_val(cy)?;
		self.append_command(Opcode::CtmShearAbout, &buf)
	}

	// ---- context stack ---------------------------------------------------------

	pub fn context_push(&mut self) -> Result<(), Error> {
		self.append_command(Opcode::ContextPush, &[])
	}
	pub fn context_pop(&mut self) -> Result<(), Error> {
		self.append_command(Opcode::ContextPop, &[])
	}

	// ---- grid text ---------------------------------------------------------

	pub fn draw_grid_chr(&mut self, gx: u8, gy: u8, ch: u16, opts: BitmapOpts) -> Result<(), Error> {
		if self.speaks_v2() && ch < 512 && opts.bits() <= 7 {
			let word: u32 = (gx as u32) | ((gy as u32) << 5) | ((ch as u32) << 9) | ((opts.bits() as u32) << 18);
			let mut buf = Vec::new();
			crate::read_write::write_u24(&mut buf, word)?;
			self.append_command(Opcode::DrawGridChrV2, &buf)
		} else {
			let mut buf = Vec::new();
			buf.push(gx);
			buf.push(gy);
			buf.write_val(ch)?;
			buf.push(opts.bits());
			self.append_command(Opcode::DrawGridChr, &buf)
		}
	}

	pub fn draw_grid_str(&mut self, gx: u8, gy: u8, s: &str, opts: BitmapOpts) -> Result<(), Error> {
		let bytes = s.as_bytes();
		if self.speaks_v2() && opts.bits() <= 7 {
			let mut buf = Vec::new();
			if bytes.len() <= 15 {
				let header: u16 = (gx as u16) | ((gy as u16) << 5) | ((opts.bits() as u16) << 9) | ((bytes.len() as u16) << 12);
				buf.write_val(header)?;
				buf.extend_from_slice(bytes);
			} else {
				let header: u16 = (gx as u16) | ((gy as u16) << 5) | ((opts.bits() as u16) << 9);
				buf.write_val(header)?;
				let mut blob = bytes.to_vec();
				blob.push(0);
				buf.extend(encode_varint(blob.len() as u32));
				buf.extend_from_slice(&blob);
			}
			self.append_command(Opcode::DrawGridStrV2, &buf)
		} else {
			let mut buf = Vec::new();
			buf.push(gx);
			buf.push(gy);
			let mut blob = bytes.to_vec();
			blob.push(0);
			buf.extend(encode_varint(blob.len() as u32));
			buf.extend_from_slice(&blob);
			buf.push(opts.bits());
			self.append_command(Opcode::DrawGridStr, &buf)
		}
	}

	// ---- raw access used by font/flash/widget/vm helpers ---------------------------------

	pub(crate) fn send_sync_opcode(&mut self, opcode: Opcode, payload: &[u8]) -> Result<Response, Error> {
		self.send_sync(opcode, payload)
	}
}

/// Null-terminates `s` and prefixes it with its varint-encoded length.
fn string_blob(s: &str) -> Vec<u8> {
	let mut blob = s.as_bytes().to_vec();
	blob.push(0);
	let mut out = encode_varint(blob.len() as u32);
	out.extend_from_slice(&blob);
	out
}

impl Drop for Session {
	fn drop(&mut self) {
		if !self.closed {
			if let Err(e) = self.close() {
				warn!("error while closing session on drop: {e}");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::transport::LoopbackTransport;

	fn connected_session(info_payload: Vec<u8>) -> Session {
		let mut frame = vec![1u8];
		frame.extend(info_payload);
		let inbound = encode_frame(&frame);
		let lb: Box<dyn Transport> = Box::new(LoopbackTransport::with_inbound(inbound));
		let mut s = Session::new(lb, 115200, SessionOptions::default());
		s.connect(false).unwrap();
		s
	}

	fn v2_info_payload() -> Vec<u8> {
		let mut p = b"AGH".to_vec();
		p.extend_from_slice(&[2, 0, 0, 16, 30]);
		p.extend_from_slice(&360u16.to_le_bytes());
		p.extend_from_slice(&288u16.to_le_bytes());
		p.push(1);
		p.push(1);
		p.extend_from_slice(&240u16.to_le_bytes());
		p.push(16);
		p
	}

	#[test]
	fn drawing_is_buffered_until_flush() {
		let mut s = connected_session(v2_info_payload());
		s.clear_screen().unwrap();
		// nothing written to the wire yet (beyond the connect handshake).
		s.flush().unwrap();
	}

	#[test]
	fn batching_bound_forces_flush() {
		let mut s = connected_session(v2_info_payload());
		for _ in 0..40 {
			s.set_stroke_width(1).unwrap();
			assert!(s.send_buffer.len() <= MAX_SEND_BUFFER_SIZE);
		}
	}

	#[test]
	fn transaction_commit_flushes_immediately() {
		let mut s = connected_session(v2_info_payload());
		s.transaction_begin().unwrap();
		s.clear_screen().unwrap();
		s.draw_grid_str(3, 4, "HELLO", BitmapOpts::default()).unwrap();
		s.transaction_commit().unwrap();
		assert!(s.send_buffer.is_empty());
	}

	#[test]
	fn grid_char_packed_word_matches_components() {
		let word: u32 = 1 | (2 << 5) | (0x41 << 9);
		assert_eq!(word, 0x008241);
	}

	#[test]
	fn capability_gate_controls_grid_opcode() {
		let mut v1 = connected_session({
			let mut p = b"AGH".to_vec();
			p.extend_from_slice(&[1, 50, 0, 16, 30]);
			p.extend_from_slice(&360u16.to_le_bytes());
			p.extend_from_slice(&288u16.to_le_bytes());
			p.push(1);
			p.push(1);
			p.extend_from_slice(&240u16.to_le_bytes());
			p.push(16);
			p
		});
		assert!(!v1.speaks_v2());
		v1.draw_grid_chr(0, 0, b'A' as u16, BitmapOpts::default()).unwrap();
		assert_eq!(v1.send_buffer[0], Opcode::DrawGridChr.as_u8());

		let mut v2 = connected_session(v2_info_payload());
		assert!(v2.speaks_v2());
		v2.draw_grid_chr(0, 0, b'A' as u16, BitmapOpts::default()).unwrap();
		assert_eq!(v2.send_buffer[0], Opcode::DrawGridChrV2.as_u8());
	}
}
