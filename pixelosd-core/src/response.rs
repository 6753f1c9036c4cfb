//! Parses a frame payload into a typed response by its leading opcode byte.

use std::io::Cursor;

use crate::error::Error;
use crate::read_write::LittleEndianReader;
use crate::types::DeviceInfo;

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
	Error { request_cmd: u8, error_code: i8 },
	Info(DeviceInfo),
	WriteFlashAck { next_addr: u32 },
	Other(Vec<u8>),
}

pub fn decode(frame: &[u8]) -> Result<Response, Error> {
	let (&opcode, rest) = frame
		.split_first()
		.ok_or_else(|| Error::Protocol("empty response frame".into()))?;

	match opcode {
		0 => {
			if rest.len() < 2 {
				return Err(Error::Protocol("truncated ERROR response".into()));
			}
			Ok(Response::Error { request_cmd: rest[0], error_code: rest[1] as i8 })
		}
		1 => Ok(Response::Info(decode_info(rest)?)),
		121 => {
			if rest.len() < 4 {
				return Err(Error::Protocol("truncated WRITE_FLASH ack".into()));
			}
			let mut cur = Cursor::new(rest);
			let next_addr: u32 = cur.read_val()?;
			Ok(Response::WriteFlashAck { next_addr })
		}
		_ => Ok(Response::Other(rest.to_vec())),
	}
}

fn decode_info(payload: &[u8]) -> Result<DeviceInfo, Error> {
	if payload == b"B" {
		return Ok(DeviceInfo { is_bootloader: true, ..Default::default() });
	}
	if payload.len() < 14 || &payload[0..3] != b"AGH" {
		return Err(Error::Protocol("INFO payload missing AGH header".into()));
	}
	let mut cur = Cursor::new(&payload[3..]);
	let major: u8 = cur.read_val()?;
	let minor: u8 = cur.read_val()?;
	let patch: u8 = cur.read_val()?;
	let grid_rows: u8 = cur.read_val()?;
	let grid_columns: u8 = cur.read_val()?;
	let pixel_width: u16 = cur.read_val()?;
	let pixel_height: u16 = cur.read_val()?;
	let tv_standard: u8 = cur.read_val()?;
	let has_detected_camera: u8 = cur.read_val()?;
	let max_frame_size: u16 = cur.read_val()?;
	let context_stack_size: u8 = cur.read_val()?;

	Ok(DeviceInfo {
		is_bootloader: false,
		major,
		minor,
		patch,
		grid_rows,
		grid_columns,
		pixel_width,
		pixel_height,
		tv_standard,
		has_detected_camera: has_detected_camera != 0,
		max_frame_size,
		context_stack_size,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_regular_info() {
		let mut payload = b"AGH".to_vec();
		payload.extend_from_slice(&[1, 2, 3, 16, 30]);
		payload.extend_from_slice(&360u16.to_le_bytes());
		payload.extend_from_slice(&288u16.to_le_bytes());
		payload.push(1);
		payload.push(1);
		payload.extend_from_slice(&240u16.to_le_bytes());
		payload.push(16);

		let mut frame = vec![1u8];
		frame.extend_from_slice(&payload);

		let resp = decode(&frame).unwrap();
		assert_eq!(
			resp,
			Response::Info(DeviceInfo {
				is_bootloader: false,
				major: 1,
				minor: 2,
				patch: 3,
				grid_rows: 16,
				grid_columns: 30,
				pixel_width: 360,
				pixel_height: 288,
				tv_standard: 1,
				has_detected_camera: true,
				max_frame_size: 240,
				context_stack_size: 16,
			})
		);
	}

	#[test]
	fn parses_bootloader_info() {
		let frame = vec![1u8, b'B'];
		let resp = decode(&frame).unwrap();
		assert_eq!(resp, Response::Info(DeviceInfo { is_bootloader: true, ..Default::default() }));
	}

	#[test]
	fn parses_error_response() {
		let frame = vec![0u8, 121, (-9i8) as u8];
		assert_eq!(decode(&frame).unwrap(), Response::Error { request_cmd: 121, error_code: -9 });
	}

	#[test]
	fn parses_write_flash_ack() {
		let mut frame = vec![121u8];
		frame.extend_from_slice(&64u32.to_le_bytes());
		assert_eq!(decode(&frame).unwrap(), Response::WriteFlashAck { next_addr: 64 });
	}
}
