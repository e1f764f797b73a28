use bytestruct::{int_enum, record, RecordDescriptor};

use super::finish;
use crate::{
	error::ProbeError,
	normalize::{unix, Encoding, Report, VolumeInfo},
	resolve::{Signature, EITHER},
	scan::{scan, Found, Layout},
	types::{Filesystem, Information, Volume},
};

/// "hsqs" on a little endian volume, "sqsh" on a big endian one.
pub const SQUASHFS_MAGIC: u64 = 0x73717368;

int_enum! {
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub enum Compression: u16 {
		Gzip = 1 => "gzip",
		Lzma = 2 => "lzma",
		Lzo = 3 => "lzo",
		Xz = 4 => "xz",
		Lz4 = 5 => "lz4",
		Zstd = 6 => "zstd",
	}
}

record! {
	pub static SUPERBLOCK: "SquashFS superblock", size = 0x60; {
		magic: U32 @ 0x00,
		inodes: U32 @ 0x04,
		mkfs_time: U32 @ 0x08,
		block_size: U32 @ 0x0C,
		fragments: U32 @ 0x10,
		compression: U16 @ 0x14,
		block_log: U16 @ 0x16,
		flags: U16 @ 0x18,
		no_ids: U16 @ 0x1A,
		major: U16 @ 0x1C,
		minor: U16 @ 0x1E,
		root_inode: U64 @ 0x20,
		bytes_used: U64 @ 0x28,
		id_table_start: U64 @ 0x30,
		xattr_id_table_start: U64 @ 0x38,
		inode_table_start: U64 @ 0x40,
		directory_table_start: U64 @ 0x48,
		fragment_table_start: U64 @ 0x50,
		lookup_table_start: U64 @ 0x58,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&SUPERBLOCK];

static LAYOUT: Layout = Layout {
	record: &SUPERBLOCK,
	locations: &[0],
	optical_offsets: &[],
	signature: Signature::Int {
		field: "magic",
		values: &[SQUASHFS_MAGIC],
	},
	orders: EITHER,
};

pub struct SquashFs;

impl SquashFs {
	fn find(&self, volume: &Volume) -> Option<Found> {
		scan(volume, &LAYOUT, |record, _| {
			matches!(record.u32("block_size"), Ok(size) if size.is_power_of_two() && size >= 4096)
		})
	}
}

impl Filesystem for SquashFs {
	fn name(&self) -> &'static str {
		"squashfs"
	}

	fn description(&self) -> &'static str {
		"Squash file system"
	}

	fn records(&self) -> &'static [&'static RecordDescriptor] {
		RECORDS
	}

	fn identify(&self, volume: &Volume) -> bool {
		self.find(volume).is_some()
	}

	fn information(&self, volume: &Volume, _: Option<Encoding>) -> Result<Information, ProbeError> {
		let found = self.find(volume).ok_or(ProbeError::MagicMismatch(self.name()))?;
		let record = &found.record;

		let block_size = record.u32("block_size")?;
		let block_log = record.u64("block_log")?;

		let mut report = Report::new(self.description());
		report.line(format_args!("Version: {}.{}", record.u64("major")?, record.u64("minor")?));
		report.line(format_args!("Byte order: {}", found.endian.name()));
		match Compression::try_from(record.u64("compression")? as u16) {
			Ok(compression) => report.line(format_args!("Compression: {}", compression)),
			Err(e) => report.warn(e),
		};
		if block_log >= 32 || 1u64 << block_log != block_size as u64 {
			report.corrupt(format_args!("block log {} does not match block size {}", block_log, block_size));
		}

		let clusters = record.u64("bytes_used")?.div_ceil(block_size as u64);
		let mut info = VolumeInfo::new(self.description(), block_size, clusters);
		info.files = Some(record.u64("inodes")?);
		info.creation_date = unix(record.u64("mkfs_time")? as i64);

		Ok(finish(report, info))
	}
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	builder(bytestruct::Endian::Little).build()
}

#[cfg(test)]
fn builder(endian: bytestruct::Endian) -> crate::testing::ImageBuilder {
	let mut image = crate::testing::ImageBuilder::new(2, 512);
	image
		.endian(endian)
		.field(0, &SUPERBLOCK, "magic", SQUASHFS_MAGIC)
		.field(0, &SUPERBLOCK, "inodes", 321)
		.field(0, &SUPERBLOCK, "mkfs_time", 1_234_567_890)
		.field(0, &SUPERBLOCK, "block_size", 131072)
		.field(0, &SUPERBLOCK, "block_log", 17)
		.field(0, &SUPERBLOCK, "compression", 4)
		.field(0, &SUPERBLOCK, "major", 4)
		.field(0, &SUPERBLOCK, "bytes_used", 1_000_000);
	image
}

#[cfg(test)]
mod tests {
	use bytestruct::Endian;

	use super::*;

	#[test]
	fn test_identify() {
		let image = sample();
		assert_eq!(&image.data()[..4], b"hsqs");
		let volume = Volume::whole(&image);
		assert!(SquashFs.identify(&volume));

		let info = SquashFs.information(&volume, None).unwrap();
		assert_eq!(info.metadata.cluster_size, 131072);
		assert_eq!(info.metadata.clusters, 8);
		assert_eq!(info.metadata.files, Some(321));
		assert_eq!(info.metadata.creation_date.unwrap().timestamp(), 1_234_567_890);
		assert!(info.text.contains("Compression: xz"));
	}

	#[test]
	fn test_big_endian_image() {
		let image = builder(Endian::Big).build();
		assert_eq!(&image.data()[..4], b"sqsh");
		let info = SquashFs.information(&Volume::whole(&image), None).unwrap();
		assert!(info.text.contains("big-endian"));
		assert_eq!(info.metadata.clusters, 8);
	}

	#[test]
	fn test_unknown_compression_warns() {
		let mut image = builder(Endian::Little);
		image.field(0, &SUPERBLOCK, "compression", 9);
		let info = SquashFs.information(&Volume::whole(&image.build()), None).unwrap();
		assert!(info.text.contains("WARNING: 9 is not a valid Compression"));
	}

	#[test]
	fn test_zeroed_magic() {
		let mut image = builder(Endian::Little);
		image.field(0, &SUPERBLOCK, "magic", 0);
		assert!(!SquashFs.identify(&Volume::whole(&image.build())));
	}
}
