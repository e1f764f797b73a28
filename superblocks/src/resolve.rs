use bytestruct::{Endian, RecordDescriptor, Value};

/// Formats that are always little endian.
pub const LITTLE: &[Endian] = &[Endian::Little];
/// Formats that are always big endian.
pub const BIG: &[Endian] = &[Endian::Big];
/// Formats written in the byte order of the machine that created them. Little endian is tried first.
pub const EITHER: &[Endian] = &[Endian::Little, Endian::Big];

/// How a format recognises its own structures.
#[derive(Debug, Clone, Copy)]
pub enum Signature {
	/// An integer field that holds one of `values` when read in the right byte order.
	///
	/// A format that documents a byte-swapped twin of its magic (a "cigam") only needs to list the
	/// logical value: reading the twin in one order is reading the magic in the other.
	Int { field: &'static str, values: &'static [u64] },

	/// A byte string field that equals one of `values`. Byte strings read the same in either order,
	/// so a match resolves to the first order the format allows.
	Bytes { field: &'static str, values: &'static [&'static [u8]] },
}

impl Signature {
	pub fn field(&self) -> &'static str {
		match self {
			Signature::Int { field, .. } | Signature::Bytes { field, .. } => field,
		}
	}
}

/// Works out which of `orders` makes the signature field of `descriptor` match, decoding only that
/// field. Returns `None` when no order matches, which means the format isn't present.
pub fn resolve(buffer: &[u8], descriptor: &RecordDescriptor, signature: &Signature, orders: &[Endian]) -> Option<Endian> {
	match signature {
		Signature::Int { field, values } => orders.iter().copied().find(|&endian| {
			matches!(descriptor.decode_field(buffer, field, endian), Ok(Value::Unsigned(v)) if values.contains(&v))
		}),
		Signature::Bytes { field, values } => match descriptor.decode_field(buffer, field, Endian::Little) {
			Ok(Value::Bytes(bytes)) if values.iter().any(|v| bytes == *v) => orders.first().copied(),
			_ => None,
		},
	}
}

#[cfg(test)]
mod tests {
	use bytestruct::record;
	use proptest::prelude::*;

	use super::*;

	record! {
		static PROBE: "probe", size = 0x10; {
			magic: U32 @ 0x00,
			magic64: U64 @ 0x08,
			name: Bytes(4) @ 0x04,
		}
	}

	const HAMMER_MAGIC: u64 = 0xC8414D4DC5523031;
	const HAMMER_MAGIC_REV: u64 = 0x313052C54D4D41C8;

	#[test]
	fn test_little_endian_match() {
		let mut buf = vec![0u8; 0x10];
		buf[0..4].copy_from_slice(&0x58465342u32.to_le_bytes());
		let sig = Signature::Int {
			field: "magic",
			values: &[0x58465342],
		};
		assert_eq!(resolve(&buf, &PROBE, &sig, EITHER), Some(Endian::Little));
		assert_eq!(resolve(&buf, &PROBE, &sig, BIG), None);
	}

	#[test]
	fn test_big_endian_match() {
		let mut buf = vec![0u8; 0x10];
		buf[0..4].copy_from_slice(b"XFSB");
		let sig = Signature::Int {
			field: "magic",
			values: &[0x58465342],
		};
		assert_eq!(resolve(&buf, &PROBE, &sig, EITHER), Some(Endian::Big));
		assert_eq!(resolve(&buf, &PROBE, &sig, BIG), Some(Endian::Big));
		assert_eq!(resolve(&buf, &PROBE, &sig, LITTLE), None);
	}

	#[test]
	fn test_swapped_twin_resolves_big() {
		let sig = Signature::Int {
			field: "magic64",
			values: &[HAMMER_MAGIC],
		};

		let mut buf = vec![0u8; 0x10];
		buf[8..16].copy_from_slice(&HAMMER_MAGIC.to_le_bytes());
		assert_eq!(resolve(&buf, &PROBE, &sig, EITHER), Some(Endian::Little));

		// A volume written by a big endian host reads as the reversed constant on a little endian one.
		buf[8..16].copy_from_slice(&HAMMER_MAGIC_REV.to_le_bytes());
		assert_eq!(resolve(&buf, &PROBE, &sig, EITHER), Some(Endian::Big));
	}

	#[test]
	fn test_byte_signature() {
		let mut buf = vec![0u8; 0x10];
		buf[4..8].copy_from_slice(b"JFS1");
		let sig = Signature::Bytes {
			field: "name",
			values: &[b"JFS1", b"JFS2"],
		};
		assert_eq!(resolve(&buf, &PROBE, &sig, LITTLE), Some(Endian::Little));
		assert_eq!(resolve(&buf, &PROBE, &sig, BIG), Some(Endian::Big));

		buf[4..8].copy_from_slice(b"1SFJ");
		assert_eq!(resolve(&buf, &PROBE, &sig, EITHER), None);
	}

	#[test]
	fn test_short_buffer_is_unknown() {
		let sig = Signature::Int {
			field: "magic64",
			values: &[HAMMER_MAGIC],
		};
		assert_eq!(resolve(&[0u8; 12], &PROBE, &sig, EITHER), None);
	}

	proptest! {
		#[test]
		fn prop_swapping_magic_flips_order(magic in any::<u32>()) {
			prop_assume!(magic != magic.swap_bytes());
			let values: &'static [u64] = Box::leak(vec![magic as u64].into_boxed_slice());
			let sig = Signature::Int { field: "magic", values };

			let mut buf = vec![0u8; 0x10];
			buf[0..4].copy_from_slice(&magic.to_le_bytes());
			prop_assert_eq!(resolve(&buf, &PROBE, &sig, EITHER), Some(Endian::Little));

			buf[0..4].copy_from_slice(&magic.swap_bytes().to_le_bytes());
			prop_assert_eq!(resolve(&buf, &PROBE, &sig, EITHER), Some(Endian::Big));
		}
	}
}
