use bytestruct::{record, RecordDescriptor};

use super::{check_count, finish};
use crate::{
	error::ProbeError,
	normalize::{free_clusters, optional_text, Encoding, Report, StringKind, VolumeInfo},
	resolve::{Signature, EITHER},
	scan::{scan, Found, Layout},
	types::{Filesystem, Information, Volume},
};

pub const BEFS_MAGIC1: u64 = 0x42465331;
pub const BEFS_MAGIC2: u64 = 0xDD121031;
pub const BEFS_MAGIC3: u64 = 0x15B6830E;
/// `flags` of a volume that was not cleanly unmounted, "DIRT".
const BEFS_DIRTY: u64 = 0x44495254;

record! {
	pub static SUPERBLOCK: "BeFS superblock", size = 0x84; {
		name: Bytes(32) @ 0x00,
		magic1: U32 @ 0x20,
		fs_byte_order: U32 @ 0x24,
		block_size: U32 @ 0x28,
		block_shift: U32 @ 0x2C,
		num_blocks: I64 @ 0x30,
		used_blocks: I64 @ 0x38,
		inode_size: I32 @ 0x40,
		magic2: U32 @ 0x44,
		blocks_per_ag: I32 @ 0x48,
		ag_shift: I32 @ 0x4C,
		num_ags: I32 @ 0x50,
		flags: U32 @ 0x54,
		log_start: I64 @ 0x60,
		log_end: I64 @ 0x68,
		magic3: U32 @ 0x70,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&SUPERBLOCK];

static LAYOUT: Layout = Layout {
	record: &SUPERBLOCK,
	// PowerPC volumes start with the superblock, x86 ones keep a boot block in front of it.
	locations: &[0, 0x200],
	optical_offsets: &[],
	signature: Signature::Int {
		field: "magic1",
		values: &[BEFS_MAGIC1],
	},
	orders: EITHER,
};

pub struct BeFs;

impl BeFs {
	fn find(&self, volume: &Volume) -> Option<Found> {
		scan(volume, &LAYOUT, |record, _| {
			matches!(record.u64("magic2"), Ok(BEFS_MAGIC2)) && matches!(record.u64("magic3"), Ok(BEFS_MAGIC3))
		})
	}
}

impl Filesystem for BeFs {
	fn name(&self) -> &'static str {
		"befs"
	}

	fn description(&self) -> &'static str {
		"Be Filesystem"
	}

	fn records(&self) -> &'static [&'static RecordDescriptor] {
		RECORDS
	}

	fn identify(&self, volume: &Volume) -> bool {
		self.find(volume).is_some()
	}

	fn information(&self, volume: &Volume, encoding: Option<Encoding>) -> Result<Information, ProbeError> {
		let found = self.find(volume).ok_or(ProbeError::MagicMismatch(self.name()))?;
		let record = &found.record;

		let block_size = record.u32("block_size")?;
		let block_shift = record.u64("block_shift")?;
		let total = record.i64("num_blocks")?.max(0) as u64;
		let used = record.i64("used_blocks")?.max(0) as u64;

		let mut report = Report::new(self.description());
		report.line(format_args!("Byte order: {}", found.endian.name()));
		report.line(format_args!("Allocation groups: {}", record.i64("num_ags")?));
		if block_shift >= 32 || 1u64 << block_shift != block_size as u64 {
			report.corrupt(format_args!(
				"block shift {} does not match block size {}",
				block_shift, block_size
			));
		}
		check_count(&mut report, "used blocks", total, used);

		let mut info = VolumeInfo::new(self.description(), block_size, total);
		info.free_clusters = Some(free_clusters(total, used));
		info.volume_name = optional_text(record.bytes("name")?, StringKind::NulTerminated, encoding.unwrap_or(Encoding::Utf8));
		info.dirty = record.u64("flags")? == BEFS_DIRTY;

		Ok(finish(report, info))
	}
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	builder(0x200, bytestruct::Endian::Little).build()
}

#[cfg(test)]
fn builder(base: u64, endian: bytestruct::Endian) -> crate::testing::ImageBuilder {
	let mut image = crate::testing::ImageBuilder::new(8, 512);
	image
		.endian(endian)
		.text(base, &SUPERBLOCK, "name", b"Haiku")
		.field(base, &SUPERBLOCK, "magic1", BEFS_MAGIC1)
		.field(base, &SUPERBLOCK, "magic2", BEFS_MAGIC2)
		.field(base, &SUPERBLOCK, "magic3", BEFS_MAGIC3)
		.field(base, &SUPERBLOCK, "block_size", 2048)
		.field(base, &SUPERBLOCK, "block_shift", 11)
		.field(base, &SUPERBLOCK, "num_blocks", 5000)
		.field(base, &SUPERBLOCK, "used_blocks", 1200)
		.field(base, &SUPERBLOCK, "num_ags", 2)
		.field(base, &SUPERBLOCK, "flags", 0x434C454E);
	image
}
