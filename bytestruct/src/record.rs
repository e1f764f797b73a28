use std::io::Cursor;

use thiserror::Error;
use uuid::Uuid;

use crate::{Endian, ReadFromWithEndian};

/// How the bytes of a single field are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
	U8,
	U16,
	U32,
	U64,
	I16,
	I32,
	I64,
	/// A fixed number of raw bytes (strings, magic strings, reserved areas).
	Bytes(usize),
	/// A Microsoft style GUID: the first three groups follow the record's byte order,
	/// the last two are always big endian.
	Guid,
	/// An RFC 4122 UUID stored in network byte order whatever the record's byte order is.
	Uuid,
}

impl FieldKind {
	pub const fn width(&self) -> usize {
		match self {
			FieldKind::U8 => 1,
			FieldKind::U16 | FieldKind::I16 => 2,
			FieldKind::U32 | FieldKind::I32 => 4,
			FieldKind::U64 | FieldKind::I64 => 8,
			FieldKind::Bytes(n) => *n,
			FieldKind::Guid | FieldKind::Uuid => 16,
		}
	}
}

/// A named field at a fixed offset inside a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
	pub name: &'static str,
	pub offset: usize,
	pub kind: FieldKind,
}

impl Field {
	pub const fn end(&self) -> usize {
		self.offset + self.kind.width()
	}

	/// Decodes this field from the start of a record. Callers check that the record is long enough.
	pub(crate) fn decode(&self, record: &[u8], endian: Endian) -> Value {
		let bytes = &record[self.offset..self.end()];
		let mut cursor = Cursor::new(bytes);

		// The slice is exactly as wide as the kind, so none of these reads can run short.
		match self.kind {
			FieldKind::U8 => Value::Unsigned(bytes[0] as u64),
			FieldKind::U16 => Value::Unsigned(u16::read_from_with_endian(&mut cursor, endian).unwrap_or_default() as u64),
			FieldKind::U32 => Value::Unsigned(u32::read_from_with_endian(&mut cursor, endian).unwrap_or_default() as u64),
			FieldKind::U64 => Value::Unsigned(u64::read_from_with_endian(&mut cursor, endian).unwrap_or_default()),
			FieldKind::I16 => Value::Signed(i16::read_from_with_endian(&mut cursor, endian).unwrap_or_default() as i64),
			FieldKind::I32 => Value::Signed(i32::read_from_with_endian(&mut cursor, endian).unwrap_or_default() as i64),
			FieldKind::I64 => Value::Signed(i64::read_from_with_endian(&mut cursor, endian).unwrap_or_default()),
			FieldKind::Bytes(_) => Value::Bytes(bytes.to_vec()),
			FieldKind::Guid => Value::Uuid(decode_guid(bytes, endian)),
			FieldKind::Uuid => Value::Uuid(Uuid::from_slice(bytes).unwrap_or_default()),
		}
	}
}

/// Decodes a mixed-endian GUID. `data1`, `data2` and `data3` are stored in `endian`,
/// while the trailing eight bytes are a plain byte sequence.
pub fn decode_guid(bytes: &[u8], endian: Endian) -> Uuid {
	let mut raw = [0u8; 16];
	raw.copy_from_slice(&bytes[..16]);
	match endian {
		Endian::Little => Uuid::from_bytes_le(raw),
		Endian::Big => Uuid::from_bytes(raw),
	}
}

/// A static description of a fixed-layout on-disk structure.
#[derive(Debug)]
pub struct RecordDescriptor {
	pub name: &'static str,
	/// The number of bytes a buffer must hold to be decoded.
	pub size: usize,
	pub fields: &'static [Field],
}

impl RecordDescriptor {
	pub fn field(&self, name: &str) -> Option<&'static Field> {
		self.fields.iter().find(|field| field.name == name)
	}

	/// Overlays the descriptor on the start of `buffer`.
	pub fn decode(&'static self, buffer: &[u8], endian: Endian) -> Result<DecodedRecord, DecodeError> {
		self.check_length(buffer)?;

		let values = self.fields.iter().map(|field| field.decode(buffer, endian)).collect();

		Ok(DecodedRecord {
			descriptor: self,
			endian,
			values,
		})
	}

	/// Decodes a single field without decoding the rest of the record.
	pub fn decode_field(&self, buffer: &[u8], name: &str, endian: Endian) -> Result<Value, DecodeError> {
		let field = self.field(name).ok_or(DecodeError::UnknownField {
			record: self.name,
			field: name.to_string(),
		})?;

		if buffer.len() < field.end() {
			return Err(DecodeError::TooShort {
				record: self.name,
				needed: field.end(),
				got: buffer.len(),
			});
		}

		Ok(field.decode(buffer, endian))
	}

	/// Returns the first field that does not fit inside the declared size, if any.
	pub fn overflowing_field(&self) -> Option<&'static Field> {
		self.fields.iter().find(|field| field.end() > self.size)
	}

	fn check_length(&self, buffer: &[u8]) -> Result<(), DecodeError> {
		if buffer.len() < self.size {
			return Err(DecodeError::TooShort {
				record: self.name,
				needed: self.size,
				got: buffer.len(),
			});
		}

		Ok(())
	}
}

/// A raw field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
	Unsigned(u64),
	Signed(i64),
	Bytes(Vec<u8>),
	Uuid(Uuid),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
	#[error("{record}: buffer of {got} bytes is too short, need {needed}")]
	TooShort { record: &'static str, needed: usize, got: usize },

	#[error("{record} has no field named {field}")]
	UnknownField { record: &'static str, field: String },

	#[error("{record}.{field} is not a {expected}")]
	KindMismatch {
		record: &'static str,
		field: &'static str,
		expected: &'static str,
	},
}

/// The result of overlaying a [`RecordDescriptor`] on a buffer.
#[derive(Debug, Clone)]
pub struct DecodedRecord {
	descriptor: &'static RecordDescriptor,
	endian: Endian,
	values: Vec<Value>,
}

impl DecodedRecord {
	pub fn descriptor(&self) -> &'static RecordDescriptor {
		self.descriptor
	}

	pub fn endian(&self) -> Endian {
		self.endian
	}

	pub fn get(&self, name: &str) -> Option<&Value> {
		self.index_of(name).map(|i| &self.values[i])
	}

	/// Returns an unsigned field widened to 64 bits.
	pub fn u64(&self, name: &str) -> Result<u64, DecodeError> {
		match self.lookup(name)? {
			(_, Value::Unsigned(v)) => Ok(*v),
			(field, _) => Err(self.mismatch(field, "unsigned integer")),
		}
	}

	/// Returns an unsigned field that is at most 32 bits wide. Wider fields are a kind mismatch.
	pub fn u32(&self, name: &str) -> Result<u32, DecodeError> {
		match self.lookup(name)? {
			(field, Value::Unsigned(v)) if matches!(field.kind, FieldKind::U8 | FieldKind::U16 | FieldKind::U32) => Ok(*v as u32),
			(field, _) => Err(self.mismatch(field, "32-bit unsigned integer")),
		}
	}

	/// Returns a signed field widened to 64 bits.
	pub fn i64(&self, name: &str) -> Result<i64, DecodeError> {
		match self.lookup(name)? {
			(_, Value::Signed(v)) => Ok(*v),
			(field, _) => Err(self.mismatch(field, "signed integer")),
		}
	}

	pub fn bytes(&self, name: &str) -> Result<&[u8], DecodeError> {
		match self.lookup(name)? {
			(_, Value::Bytes(v)) => Ok(v),
			(field, _) => Err(self.mismatch(field, "byte array")),
		}
	}

	pub fn uuid(&self, name: &str) -> Result<Uuid, DecodeError> {
		match self.lookup(name)? {
			(_, Value::Uuid(v)) => Ok(*v),
			(field, _) => Err(self.mismatch(field, "uuid")),
		}
	}

	fn index_of(&self, name: &str) -> Option<usize> {
		self.descriptor.fields.iter().position(|field| field.name == name)
	}

	fn lookup(&self, name: &str) -> Result<(&'static Field, &Value), DecodeError> {
		match self.index_of(name) {
			Some(i) => Ok((&self.descriptor.fields[i], &self.values[i])),
			None => Err(DecodeError::UnknownField {
				record: self.descriptor.name,
				field: name.to_string(),
			}),
		}
	}

	fn mismatch(&self, field: &'static Field, expected: &'static str) -> DecodeError {
		DecodeError::KindMismatch {
			record: self.descriptor.name,
			field: field.name,
			expected,
		}
	}
}
