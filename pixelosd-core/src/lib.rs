//! Low-level client for a serial/TCP-addressable OSD co-processor: a video
//! overlay renderer that speaks a framed, length-prefixed, CRC-protected
//! request/response protocol.
//!
//! Since this is a low-level library, it does not run its own event loop or
//! retry logic — callers own a [`Session`] and drive it synchronously.
//!
//! # Framing
//!
//! Every frame on the wire is `'$' 'A' <varint length> <payload> <crc8>`.
//! Most drawing commands are fire-and-forget: they're appended to an
//! internal send buffer and only hit the wire on [`Session::flush`], an
//! explicit [`Session::transaction_commit`], or when the buffer would
//! overflow. A handful of commands (INFO, font/flash/VM transfers, widget
//! config) are synchronous and block for a decoded [`Response`].
//!
//! # Reserved fields
//! When constructing packets, always set reserved bits to zero; be liberal
//! in what you accept when decoding, since firmware revisions vary.

#![allow(clippy::bool_assert_comparison)]

mod crc;
mod error;
mod flash;
mod font;
mod framer;
mod msp;
mod protocol;
mod read_write;
mod response;
mod session;
mod transport;
mod types;
mod vm;
mod widget;

pub use error::Error;
pub use font::parse_mcm;
pub use protocol::{Opcode, WidgetId, DEFAULT_BAUD_RATE, FLASH_WRITE_END, MAX_SEND_BUFFER_SIZE};
pub use read_write::{LittleEndianReader, LittleEndianWriter};
pub use response::Response;
pub use session::{Session, SessionOptions};
pub use transport::{from_uri, SerialTransport, TcpTransport, Transport};
pub use types::{
	Arg, BitmapOpts, BootloaderCompat, Color, DeviceInfo, OutlineFlag, Point, ProfilePoint, Rect, Unit,
};
pub use vm::ERR_PROGRAM_ALREADY_LOADED;
pub use widget::{AhiOptions, AhiStyle, GraphOptions, SidebarOptions};

#[cfg(test)]
mod tests {
	use super::*;
	use crate::framer::{encode_frame, read_frame};
	use crate::transport::LoopbackTransport;

	/// End-to-end connect scenario from the protocol documentation: INFO
	/// request goes out, a regular INFO response comes back, and the
	/// session records the parsed device info.
	#[test]
	fn connect_sequence_end_to_end() {
		let mut info_frame = vec![1u8];
		info_frame.extend(b"AGH");
		info_frame.extend_from_slice(&[1, 2, 3, 16, 30]);
		info_frame.extend_from_slice(&360u16.to_le_bytes());
		info_frame.extend_from_slice(&288u16.to_le_bytes());
		info_frame.push(1);
		info_frame.push(1);
		info_frame.extend_from_slice(&240u16.to_le_bytes());
		info_frame.push(16);

		let inbound = encode_frame(&info_frame);
		let lb: Box<dyn Transport> = Box::new(LoopbackTransport::with_inbound(inbound));
		let mut session = Session::new(lb, DEFAULT_BAUD_RATE, SessionOptions::default());

		assert!(!session.is_connected());
		session.connect(false).unwrap();
		assert!(session.is_connected());
		assert_eq!(session.info().unwrap().major, 1);
		assert_eq!(session.info().unwrap().grid_width(), 12);
		assert_eq!(session.info().unwrap().grid_height(), 18);
	}

	#[test]
	fn frame_round_trip_property() {
		for payload in [vec![], vec![0u8], vec![1, 2, 3, 4, 5], vec![0xFFu8; 200]] {
			let frame = encode_frame(&payload);
			let mut lb = LoopbackTransport::with_inbound(frame);
			assert_eq!(read_frame(&mut lb).unwrap(), payload);
		}
	}
}
