use std::io;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

pub trait LittleEndianReader<T> {
	fn read_val(&mut self) -> Result<T, io::Error>;
}
impl<R: ReadBytesExt> LittleEndianReader<u8> for R {
	fn read_val(&mut self) -> Result<u8, io::Error> {
		self.read_u8()
	}
}
macro_rules! derive_reader {
{ $( $m:ident: $t:ty ),*} => {
		$(
			impl<T: ReadBytesExt> LittleEndianReader<$t> for T {
				fn read_val(&mut self) -> Result<$t, io::Error> {
						self . $m ::<LittleEndian>()
				}
			}
		)*

}
}
derive_reader! { read_u32: u32, read_u16: u16, read_i16: i16, read_u64: u64, read_f32: f32 }

pub trait LittleEndianWriter<T>: WriteBytesExt {
	fn write_val(&mut self, v: T) -> Result<(), io::Error>;
}
impl<T: WriteBytesExt> LittleEndianWriter<u8> for T {
	fn write_val(&mut self, v: u8) -> Result<(), io::Error> {
		self.write_u8(v)
	}
}
impl<T: WriteBytesExt> LittleEndianWriter<bool> for T {
	fn write_val(&mut self, v: bool) -> Result<(), io::Error> {
		self.write_u8(if v { 1 } else { 0 })
	}
}
macro_rules! derive_writer {
{ $( $m:ident: $t:ty ),*} => {
	$(
		impl<T: WriteBytesExt> LittleEndianWriter<$t> for T {
			fn write_val(&mut self, v: $t) -> Result<(), io::Error> {
				self . $m ::<LittleEndian>(v)
			}
		}
	)*

}
}
derive_writer! { write_u32: u32, write_u16: u16, write_i16: i16, write_u64: u64, write_f32: f32 }

/// Reads a little-endian 24-bit unsigned value (3 bytes) widened to `u32`.
pub fn read_u24<R: ReadBytesExt>(r: &mut R) -> io::Result<u32> {
	r.read_u24::<LittleEndian>()
}

/// Writes the low 24 bits of `v` as 3 little-endian bytes.
pub fn write_u24<W: WriteBytesExt>(w: &mut W, v: u32) -> io::Result<()> {
	w.write_u24::<LittleEndian>(v)
}

/// Reads a little-endian 24-bit two's-complement value (3 bytes) sign-extended to `i32`.
pub fn read_i24<R: ReadBytesExt>(r: &mut R) -> io::Result<i32> {
	r.read_i24::<LittleEndian>()
}

/// Writes the low 24 bits of `v` as 3 little-endian bytes.
pub fn write_i24<W: WriteBytesExt>(w: &mut W, v: i32) -> io::Result<()> {
	w.write_i24::<LittleEndian>(v)
}

/// Encodes `v` as unsigned LEB128: 7 payload bits per byte, MSB is the
/// continuation flag, little-endian byte order.
pub fn encode_varint(mut v: u32) -> Vec<u8> {
	let mut out = Vec::with_capacity(5);
	loop {
		let mut byte = (v & 0x7F) as u8;
		v >>= 7;
		if v != 0 {
			byte |= 0x80;
		}
		out.push(byte);
		if v == 0 {
			break;
		}
	}
	out
}

/// Decodes an unsigned LEB128 varint from `r`, returning the value.
pub fn decode_varint<R: ReadBytesExt>(r: &mut R) -> io::Result<u32> {
	let mut result: u32 = 0;
	let mut shift = 0;
	loop {
		let byte = r.read_u8()?;
		result |= ((byte & 0x7F) as u32) << shift;
		if byte & 0x80 == 0 {
			break;
		}
		shift += 7;
	}
	Ok(result)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[test]
	fn varint_literal_vectors() {
		assert_eq!(encode_varint(0), vec![0x00]);
		assert_eq!(encode_varint(127), vec![0x7F]);
		assert_eq!(encode_varint(128), vec![0x80, 0x01]);
		assert_eq!(encode_varint(16384), vec![0x80, 0x80, 0x01]);
	}

	#[test]
	fn varint_round_trip() {
		for v in [0u32, 1, 126, 127, 128, 300, 16383, 16384, 2_000_000, u32::MAX] {
			let bytes = encode_varint(v);
			let mut cur = Cursor::new(bytes);
			assert_eq!(decode_varint(&mut cur).unwrap(), v);
		}
	}

	#[test]
	fn u24_i24_round_trip() {
		let mut buf = Vec::new();
		write_u24(&mut buf, 0xABCDEF).unwrap();
		assert_eq!(buf, vec![0xEF, 0xCD, 0xAB]);
		let mut cur = Cursor::new(buf);
		assert_eq!(read_u24(&mut cur).unwrap(), 0xABCDEF);

		let mut buf = Vec::new();
		write_i24(&mut buf, -1).unwrap();
		assert_eq!(buf, vec![0xFF, 0xFF, 0xFF]);
		let mut cur = Cursor::new(buf);
		assert_eq!(read_i24(&mut cur).unwrap(), -1);
	}
}
