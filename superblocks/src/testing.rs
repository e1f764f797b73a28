//! Builds small images for tests by writing fields through the same descriptors the probes read.

use std::io::Cursor;

use bytestruct::{Endian, FieldKind, RecordDescriptor, WriteTo, WriteToWithEndian};

use crate::source::MemoryImage;

pub(crate) struct ImageBuilder {
	data: Vec<u8>,
	sector_size: u32,
	endian: Endian,
}

impl ImageBuilder {
	pub(crate) fn new(sectors: usize, sector_size: u32) -> Self {
		Self {
			data: vec![0; sectors * sector_size as usize],
			sector_size,
			endian: Endian::Little,
		}
	}

	pub(crate) fn endian(&mut self, endian: Endian) -> &mut Self {
		self.endian = endian;
		self
	}

	/// Writes an integer field of the record starting at `base`.
	pub(crate) fn field(&mut self, base: u64, descriptor: &RecordDescriptor, name: &str, value: u64) -> &mut Self {
		let field = descriptor
			.field(name)
			.unwrap_or_else(|| panic!("{} has no field {}", descriptor.name, name));
		let at = base as usize + field.offset;
		let mut cursor = Cursor::new(&mut self.data[at..at + field.kind.width()]);

		match field.kind {
			FieldKind::U8 => (value as u8).write_to(&mut cursor),
			FieldKind::U16 | FieldKind::I16 => (value as u16).write_to_with_endian(&mut cursor, self.endian),
			FieldKind::U32 | FieldKind::I32 => (value as u32).write_to_with_endian(&mut cursor, self.endian),
			FieldKind::U64 | FieldKind::I64 => value.write_to_with_endian(&mut cursor, self.endian),
			kind => panic!("{}.{} is a {:?}, not an integer", descriptor.name, name, kind),
		}
		.expect("field fits in the image");

		self
	}

	/// Writes a byte field, padding with zeros.
	pub(crate) fn text(&mut self, base: u64, descriptor: &RecordDescriptor, name: &str, value: &[u8]) -> &mut Self {
		let field = descriptor
			.field(name)
			.unwrap_or_else(|| panic!("{} has no field {}", descriptor.name, name));
		let width = field.kind.width();
		assert!(value.len() <= width, "{}.{} is only {} bytes", descriptor.name, name, width);

		let at = base as usize + field.offset;
		self.data[at..at + width].fill(0);
		self.data[at..at + value.len()].copy_from_slice(value);
		self
	}

	/// Writes raw bytes at an absolute offset.
	pub(crate) fn bytes(&mut self, at: u64, value: &[u8]) -> &mut Self {
		let at = at as usize;
		self.data[at..at + value.len()].copy_from_slice(value);
		self
	}

	pub(crate) fn data(&self) -> &[u8] {
		&self.data
	}

	pub(crate) fn build(&self) -> MemoryImage {
		MemoryImage::new(self.data.clone(), self.sector_size)
	}
}
