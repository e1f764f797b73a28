#[macro_export]
/// int_enum provides a macro to derive an enum from a set of numbers that can be read/written,
/// with a human readable label for each variant.
macro_rules! int_enum {
	(
		$(#[$outer:meta])*
		$v:vis enum $EnumName:ident : $Type:ty {
			$(
				$(#[$inner:ident $($args:tt)*])*
				$Variant:ident = $Value:expr => $label:literal,
			)+
		}
	) => {
		$(#[$outer])*
		$v enum $EnumName {
			$(
				$(#[$inner $($args)*])*
				$Variant,
			)+
		}

		impl ::std::convert::TryFrom<$Type> for $EnumName {
			type Error = String;

			fn try_from(value: $Type) -> Result<Self, String> {
				match value {
					$(
						$Value => Ok($EnumName::$Variant),
					)+
					_ => Err(format!("{:?} is not a valid {}", value, stringify!($EnumName))),
				}
			}
		}

		impl From<&$EnumName> for $Type {
			fn from(e: &$EnumName) -> $Type {
				match e {
					$(
						$EnumName::$Variant => $Value,
					)+
				}
			}
		}

		impl ::std::fmt::Display for $EnumName {
			fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
				match self {
					$(
						$EnumName::$Variant => f.write_str($label),
					)+
				}
			}
		}

		impl $crate::Size for $EnumName {
			fn size(&self) -> usize {
				let val: $Type = self.into();
				$crate::Size::size(&val)
			}
		}

		impl $crate::ReadFromWithEndian for $EnumName {
			fn read_from_with_endian<T: ::std::io::Read>(source: &mut T, endian: $crate::Endian) -> ::std::io::Result<Self> {
				let val = <$Type as $crate::ReadFromWithEndian>::read_from_with_endian(source, endian)?;
				<$EnumName as ::std::convert::TryFrom<$Type>>::try_from(val)
					.map_err(|e| ::std::io::Error::new(::std::io::ErrorKind::InvalidData, e))
			}
		}

		impl $crate::WriteToWithEndian for $EnumName {
			fn write_to_with_endian<W: ::std::io::Write>(&self, writer: &mut W, endian: $crate::Endian) -> ::std::io::Result<()> {
				let val: $Type = self.into();
				$crate::WriteToWithEndian::write_to_with_endian(&val, writer, endian)
			}
		}
	}
}

#[macro_export]
/// record declares a static [`RecordDescriptor`](crate::RecordDescriptor). Each field is written as
/// `name: Kind @ offset`, where `Kind` is a [`FieldKind`](crate::FieldKind) variant, e.g.
///
/// ```
/// bytestruct::record! {
///     pub static HEADER: "header", size = 8; {
///         magic: Bytes(4) @ 0x00,
///         length: U32 @ 0x04,
///     }
/// }
///
/// assert_eq!(HEADER.field("length").unwrap().offset, 4);
/// ```
macro_rules! record {
	(
		$(#[$outer:meta])*
		$v:vis static $Name:ident : $label:literal, size = $size:expr; {
			$(
				$field:ident : $kind:ident $(($width:expr))? @ $offset:expr
			),+ $(,)?
		}
	) => {
		$(#[$outer])*
		$v static $Name: $crate::RecordDescriptor = $crate::RecordDescriptor {
			name: $label,
			size: $size,
			fields: &[
				$(
					$crate::Field {
						name: stringify!($field),
						offset: $offset,
						kind: $crate::FieldKind::$kind $(($width))?,
					},
				)+
			],
		};
	};
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use crate::{Endian, ReadFromWithEndian, Size, WriteToWithEndian};

	int_enum! {
		#[derive(Debug, Clone, Copy, PartialEq)]
		enum Checksum: u16 {
			Crc32c = 0 => "crc32c",
			XxHash = 1 => "xxhash64",
		}
	}

	#[test]
	fn test_int_enum_round_trips() {
		let mut buf = Vec::new();
		Checksum::XxHash.write_to_with_endian(&mut buf, Endian::Big).unwrap();
		assert_eq!(buf, [0, 1]);
		assert_eq!(Checksum::XxHash.size(), 2);

		let read = Checksum::read_from_with_endian(&mut Cursor::new(buf), Endian::Big).unwrap();
		assert_eq!(read, Checksum::XxHash);
		assert_eq!(read.to_string(), "xxhash64");
	}

	#[test]
	fn test_int_enum_rejects_unknown_values() {
		assert!(Checksum::try_from(7u16).is_err());
		let err = Checksum::read_from_with_endian(&mut Cursor::new([0u8, 9]), Endian::Big).unwrap_err();
		assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
	}

	record! {
		static SAMPLE: "sample", size = 0x10; {
			magic: U32 @ 0x00,
			name: Bytes(8) @ 0x04,
			flags: U16 @ 0x0C,
		}
	}

	#[test]
	fn test_record_macro_builds_descriptor() {
		assert_eq!(SAMPLE.name, "sample");
		assert_eq!(SAMPLE.fields.len(), 3);
		assert_eq!(SAMPLE.field("name").unwrap().kind.width(), 8);
		assert_eq!(SAMPLE.field("flags").unwrap().offset, 0x0C);
	}
}
