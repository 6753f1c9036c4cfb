//! Byte-level transports: serial and TCP, selected by a URI heuristic.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use log::trace;

use crate::error::Error;
use crate::protocol::DEFAULT_BAUD_RATE;

/// A blocking byte stream to an OSD co-processor.
pub trait Transport {
	fn write(&mut self, bytes: &[u8]) -> Result<(), Error>;
	fn read_one_byte(&mut self) -> Result<u8, Error>;
	fn close(&mut self) -> Result<(), Error>;

	/// Reopens the transport at a new baud rate, as required after
	/// `SET_DATA_RATE` negotiates a new speed with the device. Transports
	/// that have no concept of baud (e.g. TCP) reject this.
	fn reopen(&mut self, _baud: u32) -> Result<(), Error> {
		Err(Error::Config("transport does not support baud rate changes".into()))
	}
}

/// Serial port transport, opened at a fixed baud rate.
pub struct SerialTransport {
	path: String,
	port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
	pub fn open(path: &str, baud: u32) -> Result<Self, Error> {
		trace!("opening serial transport {path} at {baud} baud");
		let port = serialport::new(path, baud)
			.timeout(Duration::from_secs(5))
			.open()?;
		Ok(SerialTransport { path: path.to_string(), port })
	}
}

impl Transport for SerialTransport {
	fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.port.write_all(bytes)?;
		Ok(())
	}

	fn read_one_byte(&mut self) -> Result<u8, Error> {
		let mut buf = [0u8; 1];
		self.port.read_exact(&mut buf)?;
		Ok(buf[0])
	}

	fn close(&mut self) -> Result<(), Error> {
		Ok(())
	}

	fn reopen(&mut self, baud: u32) -> Result<(), Error> {
		trace!("reopening serial transport {} at {baud} baud", self.path);
		self.port = serialport::new(&self.path, baud).timeout(Duration::from_secs(5)).open()?;
		Ok(())
	}
}

/// TCP transport for devices exposed over a network bridge.
pub struct TcpTransport {
	stream: TcpStream,
}

impl TcpTransport {
	pub fn connect(host_port: &str) -> Result<Self, Error> {
		trace!("opening TCP transport to {host_port}");
		let stream = TcpStream::connect(host_port)?;
		stream.set_nodelay(true)?;
		Ok(TcpTransport { stream })
	}
}

impl Transport for TcpTransport {
	fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.stream.write_all(bytes)?;
		Ok(())
	}

	fn read_one_byte(&mut self) -> Result<u8, Error> {
		let mut buf = [0u8; 1];
		self.stream.read_exact(&mut buf)?;
		Ok(buf[0])
	}

	fn close(&mut self) -> Result<(), Error> {
		self.stream.shutdown(std::net::Shutdown::Both)?;
		Ok(())
	}
}

/// Picks a transport for `uri`: `host:port` is TCP, a `/dev/...` path or a
/// Windows `COM*` name is serial. Used only by the CLI binaries; library
/// callers who already know the transport kind should construct
/// [`SerialTransport`] or [`TcpTransport`] directly.
pub fn from_uri(uri: &str, baud: u32) -> Result<Box<dyn Transport>, Error> {
	if uri.contains(':') {
		Ok(Box::new(TcpTransport::connect(uri)?))
	} else if uri.starts_with("/dev/") || uri.to_ascii_uppercase().starts_with("COM") {
		Ok(Box::new(SerialTransport::open(uri, baud)?))
	} else {
		Err(Error::Config(format!("cannot determine transport kind for {uri:?}")))
	}
}

pub fn default_baud() -> u32 {
	DEFAULT_BAUD_RATE
}

/// An in-memory transport used by tests in place of hardware.
#[cfg(test)]
pub struct LoopbackTransport {
	inbound: std::collections::VecDeque<u8>,
	pub outbound: Vec<u8>,
}

#[cfg(test)]
impl LoopbackTransport {
	pub fn with_inbound(bytes: Vec<u8>) -> Self {
		LoopbackTransport { inbound: bytes.into(), outbound: Vec::new() }
	}

	pub fn push_inbound(&mut self, bytes: &[u8]) {
		self.inbound.extend(bytes);
	}
}

#[cfg(test)]
impl Transport for LoopbackTransport {
	fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.outbound.extend_from_slice(bytes);
		Ok(())
	}

	fn read_one_byte(&mut self) -> Result<u8, Error> {
		self.inbound
			.pop_front()
			.ok_or_else(|| Error::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "loopback exhausted")))
	}

	fn close(&mut self) -> Result<(), Error> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_unrecognized_uri() {
		assert!(matches!(from_uri("nonsense", 115200), Err(Error::Config(_))));
	}
}
