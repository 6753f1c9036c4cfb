use std::io;
use thiserror::Error;

/// Errors raised while talking to an OSD co-processor.
#[derive(Error, Debug)]
pub enum Error {
	/// A locally-detected configuration problem: a malformed transport URI, an
	/// out-of-range enum value, or a bad profiling point.
	#[error("config error: {0}")]
	Config(String),

	#[error("i/o error")]
	Io(#[from] io::Error),

	#[error("serial port error")]
	Serial(#[from] serialport::Error),

	/// The byte stream did not look like a valid frame: marker not found,
	/// length out of range, or CRC mismatch.
	#[error("framing error: {0}")]
	Framing(String),

	/// A response had the wrong opcode or shape for the request that produced it.
	#[error("protocol error: {0}")]
	Protocol(String),

	/// The device replied with an ERROR response. `error_code` is device-defined;
	/// some codes (e.g. -9 from the VM uploader) have documented meanings.
	#[error("device rejected command {request_cmd} with code {error_code}")]
	Remote { request_cmd: u8, error_code: i8 },

	/// A font file or VM program did not match the expected on-disk format.
	#[error("format error: {0}")]
	Format(String),
}
