use bitflags::bitflags;
use bytestruct::{record, RecordDescriptor};

use super::{check_count, finish};
use crate::{
	error::ProbeError,
	normalize::{optional_text, unix, Encoding, Report, StringKind, VolumeInfo},
	resolve::{Signature, LITTLE},
	scan::{scan, Found, Layout},
	types::{Filesystem, Information, Volume},
};

pub const EXT_MAGIC: u64 = 0xEF53;
/// Written by ext2 alphas before the magic settled.
pub const EXT_OLD_MAGIC: u64 = 0xEF51;

bitflags! {
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct Compat: u32 {
		const DIR_PREALLOC = 0x0001;
		const IMAGIC_INODES = 0x0002;
		const HAS_JOURNAL = 0x0004;
		const EXT_ATTR = 0x0008;
		/// Reserved GDT blocks for growing the filesystem.
		const RESIZE_INODE = 0x0010;
		/// Hashed b-tree directories.
		const DIR_INDEX = 0x0020;
		const LAZY_BG = 0x0040;
		const EXCLUDE_INODE = 0x0080;
		const EXCLUDE_BITMAP = 0x0100;
		const SPARSE_SUPER2 = 0x0200;
	}

	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct Incompat: u32 {
		const COMPRESSION = 0x0001;
		const FILETYPE = 0x0002;
		/// Needs journal recovery.
		const RECOVER = 0x0004;
		const JOURNAL_DEV = 0x0008;
		const META_BG = 0x0010;
		const EXTENTS = 0x0040;
		/// Block counts don't fit in 32 bits.
		const SIXTY_FOUR_BIT = 0x0080;
		/// Multiple mount protection.
		const MMP = 0x0100;
		const FLEX_BG = 0x0200;
		const EA_INODE = 0x0400;
		const DIRDATA = 0x1000;
		const CSUM_SEED = 0x2000;
		const LARGEDIR = 0x4000;
		const INLINE_DATA = 0x8000;
		const ENCRYPT = 0x10000;
	}

	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct RoCompat: u32 {
		const SPARSE_SUPER = 0x0001;
		const LARGE_FILE = 0x0002;
		const HUGE_FILE = 0x0008;
		const GDT_CSUM = 0x0010;
		const DIR_NLINK = 0x0020;
		const EXTRA_ISIZE = 0x0040;
		const HAS_SNAPSHOT = 0x0080;
		const QUOTA = 0x0100;
		const BIGALLOC = 0x0200;
		const METADATA_CSUM = 0x0400;
		const REPLICA = 0x0800;
		const READONLY = 0x1000;
		const PROJECT = 0x2000;
	}

	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct State: u16 {
		/// Cleanly unmounted.
		const VALID = 0x0001;
		const ERROR = 0x0002;
		const ORPHANS = 0x0004;
	}
}

record! {
	pub static SUPERBLOCK: "ext superblock", size = 0x400; {
		inodes_count: U32 @ 0x00,
		blocks_count_lo: U32 @ 0x04,
		free_blocks_count_lo: U32 @ 0x0C,
		free_inodes_count: U32 @ 0x10,
		first_data_block: U32 @ 0x14,
		log_block_size: U32 @ 0x18,
		mtime: U32 @ 0x2C,
		wtime: U32 @ 0x30,
		mnt_count: U16 @ 0x34,
		magic: U16 @ 0x38,
		state: U16 @ 0x3A,
		creator_os: U32 @ 0x48,
		rev_level: U32 @ 0x4C,
		feature_compat: U32 @ 0x5C,
		feature_incompat: U32 @ 0x60,
		feature_ro_compat: U32 @ 0x64,
		uuid: Uuid @ 0x68,
		volume_name: Bytes(16) @ 0x78,
		last_mounted: Bytes(64) @ 0x88,
		mkfs_time: U32 @ 0x108,
		blocks_count_hi: U32 @ 0x150,
		free_blocks_count_hi: U32 @ 0x158,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&SUPERBLOCK];

static LAYOUT: Layout = Layout {
	record: &SUPERBLOCK,
	locations: &[0x400],
	optical_offsets: &[],
	signature: Signature::Int {
		field: "magic",
		values: &[EXT_MAGIC, EXT_OLD_MAGIC],
	},
	orders: LITTLE,
};

/// The generation of an ext filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtType {
	OldExt2,
	Ext2,
	Ext3,
	Ext4,
}

impl ExtType {
	/// ext2, ext3 and ext4 share a superblock and differ in features, so the newest generation
	/// whose features are in use wins.
	pub fn from_features(compat: Compat, incompat: Incompat, ro_compat: RoCompat) -> Self {
		let ext4_ro = RoCompat::BIGALLOC | RoCompat::DIR_NLINK | RoCompat::EXTRA_ISIZE | RoCompat::HUGE_FILE | RoCompat::GDT_CSUM;
		let ext4_incompat = Incompat::SIXTY_FOUR_BIT | Incompat::EXTENTS | Incompat::FLEX_BG | Incompat::META_BG | Incompat::MMP;
		let ext3_compat = Compat::DIR_INDEX | Compat::HAS_JOURNAL;

		if ro_compat.intersects(ext4_ro) || incompat.intersects(ext4_incompat) {
			ExtType::Ext4
		} else if compat.intersects(ext3_compat) {
			ExtType::Ext3
		} else {
			ExtType::Ext2
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			ExtType::OldExt2 => "old ext2",
			ExtType::Ext2 => "ext2",
			ExtType::Ext3 => "ext3",
			ExtType::Ext4 => "ext4",
		}
	}
}

pub struct Ext;

impl Ext {
	fn find(&self, volume: &Volume) -> Option<Found> {
		// Anything past 64KiB blocks is garbage.
		scan(volume, &LAYOUT, |record, _| matches!(record.u64("log_block_size"), Ok(log) if log <= 6))
	}
}

impl Filesystem for Ext {
	fn name(&self) -> &'static str {
		"ext"
	}

	fn description(&self) -> &'static str {
		"ext2/ext3/ext4 filesystem"
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

		let compat = Compat::from_bits_retain(record.u32("feature_compat")?);
		let incompat = Incompat::from_bits_retain(record.u32("feature_incompat")?);
		let ro_compat = RoCompat::from_bits_retain(record.u32("feature_ro_compat")?);
		let state = State::from_bits_retain(record.u64("state")? as u16);

		let ext_type = if record.u64("magic")? == EXT_OLD_MAGIC {
			ExtType::OldExt2
		} else {
			ExtType::from_features(compat, incompat, ro_compat)
		};

		let (mut blocks, mut free_blocks) = (record.u64("blocks_count_lo")?, record.u64("free_blocks_count_lo")?);
		if incompat.contains(Incompat::SIXTY_FOUR_BIT) {
			blocks |= record.u64("blocks_count_hi")? << 32;
			free_blocks |= record.u64("free_blocks_count_hi")? << 32;
		}

		let inodes = record.u64("inodes_count")?;
		let free_inodes = record.u64("free_inodes_count")?;

		let mut report = Report::new(format_args!("{} ({})", self.description(), ext_type.name()));
		report.line(format_args!("Revision: {}", record.u64("rev_level")?));
		report.line(format_args!("Mount count: {}", record.u64("mnt_count")?));
		if let Some(path) = optional_text(record.bytes("last_mounted")?, StringKind::NulTerminated, Encoding::Utf8) {
			report.line(format_args!("Last mounted on: {}", path));
		}
		if incompat.contains(Incompat::RECOVER) {
			report.line("Journal needs recovery");
		}
		check_count(&mut report, "free blocks", blocks, free_blocks);
		check_count(&mut report, "free inodes", inodes, free_inodes);

		let mut info = VolumeInfo::new(ext_type.name(), 1024 << record.u32("log_block_size")?, blocks);
		info.free_clusters = Some(free_blocks);
		info.files = Some(inodes.saturating_sub(free_inodes));
		info.volume_name = optional_text(record.bytes("volume_name")?, StringKind::NulTerminated, encoding.unwrap_or(Encoding::Utf8));
		info.volume_serial = Some(record.uuid("uuid")?.to_string());
		info.creation_date = unix(record.u64("mkfs_time")? as i64);
		info.modification_date = unix(record.u64("wtime")? as i64);
		info.dirty = !state.contains(State::VALID) || state.contains(State::ERROR);

		Ok(finish(report, info))
	}
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	builder().build()
}

#[cfg(test)]
fn builder() -> crate::testing::ImageBuilder {
	let mut image = crate::testing::ImageBuilder::new(8, 512);
	image
		.field(0x400, &SUPERBLOCK, "magic", EXT_MAGIC)
		.field(0x400, &SUPERBLOCK, "inodes_count", 2048)
		.field(0x400, &SUPERBLOCK, "free_inodes_count", 2037)
		.field(0x400, &SUPERBLOCK, "blocks_count_lo", 8192)
		.field(0x400, &SUPERBLOCK, "free_blocks_count_lo", 7000)
		.field(0x400, &SUPERBLOCK, "log_block_size", 0)
		.field(0x400, &SUPERBLOCK, "state", State::VALID.bits() as u64)
		.field(0x400, &SUPERBLOCK, "rev_level", 1)
		.field(0x400, &SUPERBLOCK, "mkfs_time", 1_600_000_000)
		.field(0x400, &SUPERBLOCK, "wtime", 1_700_000_000)
		.text(0x400, &SUPERBLOCK, "volume_name", b"boot");
	image
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_identify_ext2() {
		let image = sample();
		let volume = Volume::whole(&image);
		assert!(Ext.identify(&volume));

		let info = Ext.information(&volume, None).unwrap();
		assert_eq!(info.metadata.filesystem_type, "ext2");
		assert_eq!(info.metadata.cluster_size, 1024);
		assert_eq!(info.metadata.clusters, 8192);
		assert_eq!(info.metadata.free_clusters, Some(7000));
		assert_eq!(info.metadata.files, Some(11));
		assert_eq!(info.metadata.volume_name.as_deref(), Some("boot"));
		assert_eq!(info.metadata.creation_date.unwrap().timestamp(), 1_600_000_000);
		assert!(!info.metadata.dirty);
	}

	#[test]
	fn test_type_from_features() {
		assert_eq!(ExtType::from_features(Compat::empty(), Incompat::FILETYPE, RoCompat::SPARSE_SUPER), ExtType::Ext2);
		assert_eq!(ExtType::from_features(Compat::HAS_JOURNAL, Incompat::FILETYPE, RoCompat::empty()), ExtType::Ext3);
		assert_eq!(ExtType::from_features(Compat::HAS_JOURNAL, Incompat::EXTENTS, RoCompat::empty()), ExtType::Ext4);
		assert_eq!(ExtType::from_features(Compat::empty(), Incompat::empty(), RoCompat::HUGE_FILE), ExtType::Ext4);
	}

	#[test]
	fn test_64bit_block_counts() {
		let mut image = builder();
		image
			.field(0x400, &SUPERBLOCK, "feature_incompat", (Incompat::SIXTY_FOUR_BIT | Incompat::EXTENTS).bits() as u64)
			.field(0x400, &SUPERBLOCK, "blocks_count_hi", 1)
			.field(0x400, &SUPERBLOCK, "log_block_size", 2)
			.field(0x400, &SUPERBLOCK, "state", State::ERROR.bits() as u64);
		let info = Ext.information(&Volume::whole(&image.build()), None).unwrap();
		assert_eq!(info.metadata.filesystem_type, "ext4");
		assert_eq!(info.metadata.clusters, (1 << 32) + 8192);
		assert_eq!(info.metadata.cluster_size, 4096);
		assert!(info.metadata.dirty);
	}

	#[test]
	fn test_old_magic() {
		let mut image = builder();
		image.field(0x400, &SUPERBLOCK, "magic", EXT_OLD_MAGIC);
		let info = Ext.information(&Volume::whole(&image.build()), None).unwrap();
		assert_eq!(info.metadata.filesystem_type, "old ext2");
	}

	#[test]
	fn test_zeroed_magic() {
		let mut image = builder();
		image.field(0x400, &SUPERBLOCK, "magic", 0);
		assert!(!Ext.identify(&Volume::whole(&image.build())));
	}
}
