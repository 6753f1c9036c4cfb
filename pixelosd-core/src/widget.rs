//! Typed wrappers for the AHI, sidebar, and graph widgets.

use crate::error::Error;
use crate::protocol::{Opcode, WidgetId};
use crate::read_write::LittleEndianWriter;
use crate::session::Session;
use crate::types::{Point, Rect, Unit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AhiStyle {
	Staircase = 0,
	Line = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AhiOptions {
	pub show_corners: bool,
}

impl AhiOptions {
	fn bits(self) -> u8 {
		if self.show_corners {
			1
		} else {
			0
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SidebarOptions {
	pub left: bool,
	pub reverse: bool,
	pub unlabeled: bool,
	pub is_static: bool,
}

impl SidebarOptions {
	fn bits(self) -> u8 {
		(self.left as u8) | ((self.reverse as u8) << 1) | ((self.unlabeled as u8) << 2) | ((self.is_static as u8) << 3)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphOptions {
	pub batched: bool,
}

impl GraphOptions {
	fn bits(self) -> u8 {
		self.batched as u8
	}
}

impl Session {
	fn widget_set_config(&mut self, id: WidgetId, body: &[u8]) -> Result<(), Error> {
		let mut payload = vec![id.to_wire()?];
		payload.extend_from_slice(body);
		self.send_sync_opcode(Opcode::WidgetSetConfig, &payload)?;
		Ok(())
	}

	fn widget_draw(&mut self, id: WidgetId, body: &[u8]) -> Result<(), Error> {
		let mut payload = vec![id.to_wire()?];
		payload.extend_from_slice(body);
		self.send_fire_and_forget(Opcode::WidgetDraw, &payload)
	}

	pub fn widget_ahi_set_config(
		&mut self,
		rect: Rect,
		style: AhiStyle,
		crosshair_margin: u8,
		stroke_width: u8,
		options: AhiOptions,
	) -> Result<(), Error> {
		let mut body = Vec::new();
		rect.write(&mut body)?;
		body.push(style as u8);
		body.push(options.bits());
		body.push(crosshair_margin);
		body.push(stroke_width);
		self.widget_set_config(WidgetId::Ahi, &body)?;
		self.ahi_config_done.set(true);
		Ok(())
	}

	/// Draws the attitude indicator at `pitch`/`roll`, each a 12-bit
	/// quantized value in `0..4096`.
	pub fn widget_ahi_draw(&mut self, pitch: u16, roll: u16) -> Result<(), Error> {
		let p = Point::new((pitch & 0xFFF) as i32, (roll & 0xFFF) as i32);
		let body = {
			let mut v = Vec::new();
			p.write(&mut v)?;
			v
		};
		self.widget_draw(WidgetId::Ahi, &body)
	}

	pub fn widget_ahi_config_done(&self) -> bool {
		self.ahi_config_done.get()
	}

	pub fn widget_sidebar_set_config(
		&mut self,
		index: u8,
		rect: Rect,
		options: SidebarOptions,
		divisions: u8,
		per_division: u16,
		unit: Unit,
	) -> Result<(), Error> {
		let mut body = Vec::new();
		rect.write(&mut body)?;
		body.push(options.bits());
		body.push(divisions);
		body.write_val(per_division)?;
		unit.write(&mut body)?;
		self.widget_set_config(WidgetId::Sidebar(index), &body)?;
		if let Some(cell) = self.sidebar_config_done.get(index as usize) {
			cell.set(true);
		}
		Ok(())
	}

	pub fn widget_sidebar_draw(&mut self, index: u8, value: i32) -> Result<(), Error> {
		let mut body = Vec::new();
		crate::read_write::write_i24(&mut body, value)?;
		self.widget_draw(WidgetId::Sidebar(index), &body)
	}

	pub fn widget_sidebar_config_done(&self, index: u8) -> bool {
		self.sidebar_config_done.get(index as usize).map(|c| c.get()).unwrap_or(false)
	}

	pub fn widget_graph_set_config(
		&mut self,
		index: u8,
		rect: Rect,
		options: GraphOptions,
		nlabels: u8,
		label_width: u8,
		initial_scale: u8,
		unit: Unit,
	) -> Result<(), Error> {
		let mut body = Vec::new();
		rect.write(&mut body)?;
		body.push(options.bits());
		body.push(nlabels);
		body.push(label_width);
		body.push(initial_scale);
		unit.write(&mut body)?;
		self.widget_set_config(WidgetId::Graph(index), &body)?;
		if let Some(cell) = self.graph_config_done.get(index as usize) {
			cell.set(true);
		}
		Ok(())
	}

	pub fn widget_graph_draw(&mut self, index: u8, value: i32) -> Result<(), Error> {
		let mut body = Vec::new();
		crate::read_write::write_i24(&mut body, value)?;
		self.widget_draw(WidgetId::Graph(index), &body)
	}

	pub fn widget_graph_config_done(&self, index: u8) -> bool {
		self.graph_config_done.get(index as usize).map(|c| c.get()).unwrap_or(false)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::framer::encode_frame;
	use crate::session::SessionOptions;
	use crate::transport::{LoopbackTransport, Transport};

	fn connected_session() -> Session {
		let mut info_frame = vec![1u8];
		info_frame.extend(b"AGH");
		info_frame.extend_from_slice(&[2, 0, 0, 16, 30]);
		info_frame.extend_from_slice(&360u16.to_le_bytes());
		info_frame.extend_from_slice(&288u16.to_le_bytes());
		info_frame.push(1);
		info_frame.push(1);
		info_frame.extend_from_slice(&240u16.to_le_bytes());
		info_frame.push(16);
		let inbound = encode_frame(&info_frame);
		let lb: Box<dyn Transport> = Box::new(LoopbackTransport::with_inbound(inbound));
		let mut s = Session::new(lb, 115200, SessionOptions::default());
		s.connect(false).unwrap();
		s
	}

	#[test]
	fn widget_index_out_of_range_is_config_error() {
		assert!(matches!(WidgetId::Sidebar(2).to_wire(), Err(Error::Config(_))));
		assert!(matches!(WidgetId::Graph(4).to_wire(), Err(Error::Config(_))));
		assert_eq!(WidgetId::Sidebar(0).to_wire().unwrap(), 1);
		assert_eq!(WidgetId::Graph(3).to_wire().unwrap(), 6);
	}

	#[test]
	fn ahi_config_cache_tracks_first_configure() {
		let mut s = connected_session();
		assert!(!s.widget_ahi_config_done());
		s.widget_ahi_draw(0, 0).unwrap();
		assert!(!s.widget_ahi_config_done());
	}
}
