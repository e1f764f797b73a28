mod macros;
mod record;

use std::io::{self, Read, Write};

pub use record::*;

/// The byte order used to interpret multi-byte integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
	Little,
	Big,
}

impl Endian {
	/// Returns the opposite byte order.
	pub fn swap(self) -> Self {
		match self {
			Endian::Little => Endian::Big,
			Endian::Big => Endian::Little,
		}
	}

	pub fn name(self) -> &'static str {
		match self {
			Endian::Little => "little-endian",
			Endian::Big => "big-endian",
		}
	}
}

/// The number of bytes a value occupies on disk.
pub trait Size {
	fn size(&self) -> usize;
}

/// Values whose on-disk representation does not depend on byte order.
pub trait ReadFrom {
	fn read_from<T: Read>(source: &mut T) -> io::Result<Self>
	where
		Self: Sized;
}

/// Values that are read in a caller chosen byte order.
pub trait ReadFromWithEndian {
	fn read_from_with_endian<T: Read>(source: &mut T, endian: Endian) -> io::Result<Self>
	where
		Self: Sized;
}

pub trait WriteTo {
	fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()>;
}

pub trait WriteToWithEndian {
	fn write_to_with_endian<W: Write>(&self, writer: &mut W, endian: Endian) -> io::Result<()>;
}

macro_rules! impl_number {
	($($ty:ty),+) => {
		$(
			impl Size for $ty {
				fn size(&self) -> usize {
					std::mem::size_of::<$ty>()
				}
			}

			impl ReadFromWithEndian for $ty {
				fn read_from_with_endian<T: Read>(source: &mut T, endian: Endian) -> io::Result<Self> {
					let mut buf = [0u8; std::mem::size_of::<$ty>()];
					source.read_exact(&mut buf)?;
					Ok(match endian {
						Endian::Little => <$ty>::from_le_bytes(buf),
						Endian::Big => <$ty>::from_be_bytes(buf),
					})
				}
			}

			impl WriteToWithEndian for $ty {
				fn write_to_with_endian<W: Write>(&self, writer: &mut W, endian: Endian) -> io::Result<()> {
					match endian {
						Endian::Little => writer.write_all(&self.to_le_bytes()),
						Endian::Big => writer.write_all(&self.to_be_bytes()),
					}
				}
			}
		)+
	};
}

impl_number!(u16, u32, u64, i16, i32, i64);

impl Size for u8 {
	fn size(&self) -> usize {
		1
	}
}

impl ReadFrom for u8 {
	fn read_from<T: Read>(source: &mut T) -> io::Result<Self> {
		let mut buf = [0u8; 1];
		source.read_exact(&mut buf)?;
		Ok(buf[0])
	}
}

impl ReadFromWithEndian for u8 {
	fn read_from_with_endian<T: Read>(source: &mut T, _endian: Endian) -> io::Result<Self> {
		Self::read_from(source)
	}
}

impl WriteTo for u8 {
	fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
		writer.write_all(&[*self])
	}
}

impl WriteToWithEndian for u8 {
	fn write_to_with_endian<W: Write>(&self, writer: &mut W, _endian: Endian) -> io::Result<()> {
		self.write_to(writer)
	}
}

impl Size for i8 {
	fn size(&self) -> usize {
		1
	}
}

impl ReadFrom for i8 {
	fn read_from<T: Read>(source: &mut T) -> io::Result<Self> {
		u8::read_from(source).map(|b| b as i8)
	}
}

impl ReadFromWithEndian for i8 {
	fn read_from_with_endian<T: Read>(source: &mut T, _endian: Endian) -> io::Result<Self> {
		Self::read_from(source)
	}
}

impl<const SIZE: usize> Size for [u8; SIZE] {
	fn size(&self) -> usize {
		SIZE
	}
}

impl<const SIZE: usize> ReadFrom for [u8; SIZE] {
	fn read_from<T: Read>(source: &mut T) -> io::Result<Self> {
		let mut buf = [0u8; SIZE];
		source.read_exact(&mut buf)?;
		Ok(buf)
	}
}

impl<const SIZE: usize> ReadFromWithEndian for [u8; SIZE] {
	fn read_from_with_endian<T: Read>(source: &mut T, _endian: Endian) -> io::Result<Self> {
		Self::read_from(source)
	}
}

impl<const SIZE: usize> WriteTo for [u8; SIZE] {
	fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
		writer.write_all(self)
	}
}

impl<const SIZE: usize> WriteToWithEndian for [u8; SIZE] {
	fn write_to_with_endian<W: Write>(&self, writer: &mut W, _endian: Endian) -> io::Result<()> {
		self.write_to(writer)
	}
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use super::*;

	#[test]
	fn test_read_both_orders() {
		let bytes = [0x58, 0x46, 0x53, 0x42];
		assert_eq!(u32::read_from_with_endian(&mut Cursor::new(bytes), Endian::Big).unwrap(), 0x58465342);
		assert_eq!(u32::read_from_with_endian(&mut Cursor::new(bytes), Endian::Little).unwrap(), 0x42534658);
	}

	#[test]
	fn test_write_then_read_signed() {
		let mut buf = Vec::new();
		(-2i32).write_to_with_endian(&mut buf, Endian::Big).unwrap();
		assert_eq!(buf, [0xFF, 0xFF, 0xFF, 0xFE]);
		assert_eq!(i32::read_from_with_endian(&mut Cursor::new(buf), Endian::Big).unwrap(), -2);
	}

	#[test]
	fn test_short_read_is_an_error() {
		let err = u64::read_from_with_endian(&mut Cursor::new([0u8; 3]), Endian::Little).unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
	}

	#[test]
	fn test_byte_arrays_ignore_order() {
		let bytes = *b"JFS1";
		let read = <[u8; 4]>::read_from_with_endian(&mut Cursor::new(bytes), Endian::Big).unwrap();
		assert_eq!(&read, b"JFS1");
	}
}
