use bytestruct::{record, Endian, RecordDescriptor};

use super::finish;
use crate::{
	error::ProbeError,
	normalize::{amiga, optional_text, Encoding, Report, StringKind, VolumeInfo},
	resolve::{Signature, BIG},
	scan::{any, scan, Found, Layout},
	types::{Filesystem, Information, Volume},
};

/// `DOS\0` through `DOS\7`.
const DOS_TYPES: [u64; 8] = [0x444F5300, 0x444F5301, 0x444F5302, 0x444F5303, 0x444F5304, 0x444F5305, 0x444F5306, 0x444F5307];
const T_HEADER: u64 = 2;
const ST_ROOT: u64 = 1;
/// The tail of a root block is the last 200 bytes, whatever the block size.
const TAIL_SIZE: usize = 200;
const BOOT_BLOCK_SIZE: usize = 1024;

record! {
	pub static BOOT_BLOCK: "AmigaDOS boot block", size = 0x0C; {
		disk_type: U32 @ 0x00,
		checksum: U32 @ 0x04,
		root_block: U32 @ 0x08,
	}
}

record! {
	pub static ROOT_HEADER: "AmigaDOS root block", size = 0x18; {
		block_type: U32 @ 0x00,
		header_key: U32 @ 0x04,
		high_seq: U32 @ 0x08,
		hash_table_size: U32 @ 0x0C,
		first_data: U32 @ 0x10,
		checksum: U32 @ 0x14,
	}
}

record! {
	pub static ROOT_TAIL: "AmigaDOS root block tail", size = TAIL_SIZE; {
		bitmap_flag: I32 @ 0,
		bitmap_ext: U32 @ 104,
		r_days: U32 @ 108,
		r_mins: U32 @ 112,
		r_ticks: U32 @ 116,
		name: Bytes(31) @ 120,
		v_days: U32 @ 160,
		v_mins: U32 @ 164,
		v_ticks: U32 @ 168,
		c_days: U32 @ 172,
		c_mins: U32 @ 176,
		c_ticks: U32 @ 180,
		next_hash: U32 @ 184,
		parent_dir: U32 @ 188,
		extension: U32 @ 192,
		sec_type: U32 @ 196,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&BOOT_BLOCK, &ROOT_HEADER, &ROOT_TAIL];

static LAYOUT: Layout = Layout {
	record: &BOOT_BLOCK,
	locations: &[0],
	optical_offsets: &[],
	signature: Signature::Int {
		field: "disk_type",
		values: &DOS_TYPES,
	},
	orders: BIG,
};

/// Sums big endian words, wrapping on overflow.
fn word_sum(block: &[u8]) -> u32 {
	block
		.chunks_exact(4)
		.fold(0u32, |sum, word| sum.wrapping_add(u32::from_be_bytes([word[0], word[1], word[2], word[3]])))
}

/// Boot blocks use a ones' complement sum: the carry is added back in.
fn boot_sum(block: &[u8]) -> u32 {
	block.chunks_exact(4).fold(0u32, |sum, word| {
		let (sum, carry) = sum.overflowing_add(u32::from_be_bytes([word[0], word[1], word[2], word[3]]));
		sum + carry as u32
	})
}

struct RootBlock {
	boot: Found,
	tail: bytestruct::DecodedRecord,
	block_size: usize,
}

pub struct Amiga;

impl Amiga {
	fn find(&self, volume: &Volume) -> Option<RootBlock> {
		let boot = scan(volume, &LAYOUT, any)?;
		let sector_size = volume.sector_size() as u64;

		// The root block sits in the middle of the partition unless the boot block says otherwise.
		let root = match boot.record.u64("root_block") {
			Ok(root) if root != 0 => root,
			_ => (volume.partition().length() + 1) / 2,
		};

		let header = volume.read_record(root * sector_size, &ROOT_HEADER, Endian::Big).ok()?;
		if header.u64("block_type").ok()? != T_HEADER {
			return None;
		}

		let block_size = (header.u64("hash_table_size").ok()? as usize + 56) * 4;
		if !(512..=32768).contains(&block_size) {
			return None;
		}

		let block = volume.read_bytes(root * sector_size, block_size).ok()?;
		if word_sum(&block) != 0 {
			return None;
		}

		let tail = ROOT_TAIL.decode(&block[block_size - TAIL_SIZE..], Endian::Big).ok()?;
		if tail.u64("sec_type").ok()? != ST_ROOT {
			return None;
		}

		Some(RootBlock { boot, tail, block_size })
	}
}

impl Filesystem for Amiga {
	fn name(&self) -> &'static str {
		"amiga"
	}

	fn description(&self) -> &'static str {
		"Amiga filesystem"
	}

	fn records(&self) -> &'static [&'static RecordDescriptor] {
		RECORDS
	}

	fn identify(&self, volume: &Volume) -> bool {
		self.find(volume).is_some()
	}

	fn information(&self, volume: &Volume, _: Option<Encoding>) -> Result<Information, ProbeError> {
		let RootBlock { boot, tail, block_size } = self.find(volume).ok_or(ProbeError::MagicMismatch(self.name()))?;

		let flavour = boot.record.u64("disk_type")? & 0x7;
		let kind = match flavour {
			0 => "Amiga Original File System",
			1 => "Amiga Fast File System",
			2 => "Amiga International Original File System",
			3 => "Amiga International Fast File System",
			4 => "Amiga Original File System with directory cache",
			5 => "Amiga Fast File System with directory cache",
			6 => "Amiga Original File System with long filenames",
			_ => "Amiga Fast File System with long filenames",
		};

		let mut report = Report::new(kind);
		report.line(format_args!("Block size: {} bytes", block_size));

		let boot_block = volume.read_bytes(0, BOOT_BLOCK_SIZE).ok();
		let bootable = boot_block.as_deref().is_some_and(|block| boot_sum(block) == u32::MAX);

		let mut info = VolumeInfo::new(kind, block_size as u32, volume.size_in_bytes() / block_size as u64);
		info.volume_name = optional_text(tail.bytes("name")?, StringKind::Pascal, Encoding::Latin1);
		info.creation_date = amiga(tail.u32("c_days")?, tail.u32("c_mins")?, tail.u32("c_ticks")?);
		info.modification_date = amiga(tail.u32("r_days")?, tail.u32("r_mins")?, tail.u32("r_ticks")?);
		info.dirty = tail.i64("bitmap_flag")? != -1;
		info.bootable = bootable;

		Ok(finish(report, info))
	}
}

#[cfg(test)]
fn builder(root: u64, boot_pointer: u64) -> crate::testing::ImageBuilder {
	use crate::testing::ImageBuilder;

	let mut image = ImageBuilder::new(1760, 512);
	let at = root * 512;
	let tail = at + 512 - TAIL_SIZE as u64;
	image
		.endian(Endian::Big)
		.field(0, &BOOT_BLOCK, "disk_type", DOS_TYPES[1])
		.field(0, &BOOT_BLOCK, "root_block", boot_pointer)
		.field(at, &ROOT_HEADER, "block_type", T_HEADER)
		.field(at, &ROOT_HEADER, "hash_table_size", 72)
		.field(tail, &ROOT_TAIL, "bitmap_flag", u32::MAX as u64)
		.text(tail, &ROOT_TAIL, "name", b"\x09Workbench")
		.field(tail, &ROOT_TAIL, "c_days", 5000)
		.field(tail, &ROOT_TAIL, "c_mins", 600)
		.field(tail, &ROOT_TAIL, "c_ticks", 25)
		.field(tail, &ROOT_TAIL, "r_days", 5001)
		.field(tail, &ROOT_TAIL, "sec_type", ST_ROOT);
	seal_root(&mut image, at);
	image
}

#[cfg(test)]
fn seal_root(image: &mut crate::testing::ImageBuilder, at: u64) {
	let start = at as usize;
	image.bytes(at + 0x14, &[0; 4]);
	let sum = word_sum(&image.data()[start..start + 512]);
	image.field(at, &ROOT_HEADER, "checksum", sum.wrapping_neg() as u64);
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	builder(880, 880).build()
}
