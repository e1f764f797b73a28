use bytestruct::{record, RecordDescriptor};

use super::{check_count, finish};
use crate::{
	error::ProbeError,
	normalize::{optional_text, Encoding, Report, StringKind, VolumeInfo},
	resolve::{Signature, BIG},
	scan::{scan, Found, Layout},
	types::{Filesystem, Information, Volume},
};

pub const XFS_MAGIC: u64 = 0x58465342;

record! {
	pub static SUPERBLOCK: "XFS superblock", size = 160; {
		magic: U32 @ 0,
		blocksize: U32 @ 4,
		dblocks: U64 @ 8,
		rblocks: U64 @ 16,
		rextents: U64 @ 24,
		uuid: Uuid @ 32,
		logstart: U64 @ 48,
		rootino: U64 @ 56,
		agblocks: U32 @ 84,
		agcount: U32 @ 88,
		versionnum: U16 @ 100,
		sectsize: U16 @ 102,
		inodesize: U16 @ 104,
		fname: Bytes(12) @ 108,
		blocklog: U8 @ 120,
		inprogress: U8 @ 126,
		icount: U64 @ 128,
		ifree: U64 @ 136,
		fdblocks: U64 @ 144,
		frextents: U64 @ 152,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&SUPERBLOCK];

static LAYOUT: Layout = Layout {
	record: &SUPERBLOCK,
	locations: &[0],
	// mkisofs style images can leave the superblock partway into the first 2048 byte sector.
	optical_offsets: &[0, 0x200, 0x400],
	signature: Signature::Int {
		field: "magic",
		values: &[XFS_MAGIC],
	},
	orders: BIG,
};

pub struct Xfs;

impl Xfs {
	fn find(&self, volume: &Volume) -> Option<Found> {
		scan(volume, &LAYOUT, |record, _| {
			matches!(record.u64("blocksize"), Ok(size) if size > 0) && matches!(record.u64("agcount"), Ok(count) if count > 0)
		})
	}
}

impl Filesystem for Xfs {
	fn name(&self) -> &'static str {
		"xfs"
	}

	fn description(&self) -> &'static str {
		"XFS filesystem"
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

		let blocksize = record.u32("blocksize")?;
		let icount = record.u64("icount")?;
		let ifree = record.u64("ifree")?;

		let mut report = Report::new(self.description());
		report.line(format_args!("Version: {}", record.u64("versionnum")? & 0xF));
		report.line(format_args!("Allocation groups: {}", record.u64("agcount")?));
		if !blocksize.is_power_of_two() {
			report.corrupt(format_args!("block size {} is not a power of two", blocksize));
		}
		check_count(&mut report, "free inodes", icount, ifree);

		let mut info = VolumeInfo::new(self.description(), blocksize, record.u64("dblocks")?);
		info.free_clusters = Some(record.u64("fdblocks")?);
		info.files = Some(icount.saturating_sub(ifree));
		info.volume_name = optional_text(record.bytes("fname")?, StringKind::NulTerminated, encoding.unwrap_or(Encoding::Utf8));
		info.volume_serial = Some(record.uuid("uuid")?.to_string());
		info.dirty = record.u64("inprogress")? != 0;

		Ok(finish(report, info))
	}
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	builder(0, 512, bytestruct::Endian::Big).build()
}

#[cfg(test)]
fn builder(base: u64, sector_size: u32, endian: bytestruct::Endian) -> crate::testing::ImageBuilder {
	let mut image = crate::testing::ImageBuilder::new(16384 / sector_size as usize, sector_size);
	image
		.endian(endian)
		.field(base, &SUPERBLOCK, "magic", XFS_MAGIC)
		.field(base, &SUPERBLOCK, "blocksize", 4096)
		.field(base, &SUPERBLOCK, "dblocks", 262144)
		.field(base, &SUPERBLOCK, "agcount", 4)
		.field(base, &SUPERBLOCK, "versionnum", 0xB4A5)
		.field(base, &SUPERBLOCK, "icount", 64)
		.field(base, &SUPERBLOCK, "ifree", 61)
		.field(base, &SUPERBLOCK, "fdblocks", 250000)
		.text(base, &SUPERBLOCK, "fname", b"scratch")
		.bytes(base + 32, &[0x4a, 0x1b, 0xfa, 0x2a, 0x0c, 0x61, 0x4f, 0x8e, 0x9e, 0x27, 0x7a, 0x5a, 0x0e, 0x3d, 0xc7, 0x11]);
	image
}

#[cfg(test)]
mod tests {
	use bytestruct::Endian;

	use super::*;
	use crate::source::{MediaKind, Partition, SectorSource};

	#[test]
	fn test_big_endian_superblock() {
		let image = sample();
		let volume = Volume::whole(&image);
		assert!(Xfs.identify(&volume));

		let info = Xfs.information(&volume, None).unwrap();
		assert_eq!(info.metadata.cluster_size, 4096);
		assert_eq!(info.metadata.clusters, 262144);
		assert_eq!(info.metadata.free_clusters, Some(250000));
		assert_eq!(info.metadata.files, Some(3));
		assert_eq!(info.metadata.volume_name.as_deref(), Some("scratch"));
		assert_eq!(info.metadata.volume_serial.as_deref(), Some("4a1bfa2a-0c61-4f8e-9e27-7a5a0e3dc711"));
		assert!(!info.metadata.dirty);
		assert!(info.text.contains("Version: 5"));
	}

	#[test]
	fn test_little_endian_superblock_is_not_xfs() {
		let image = builder(0, 512, Endian::Little).build();
		assert!(!Xfs.identify(&Volume::whole(&image)));
	}

	#[test]
	fn test_zeroed_magic() {
		let mut image = builder(0, 512, Endian::Big);
		image.field(0, &SUPERBLOCK, "magic", 0);
		assert!(!Xfs.identify(&Volume::whole(&image.build())));
	}

	#[test]
	fn test_misaligned_on_optical_media() {
		let image = builder(0x200, 2048, Endian::Big).build();
		assert_eq!(image.media_kind(), MediaKind::Optical);
		assert!(Xfs.identify(&Volume::whole(&image)));

		let disk = image.clone().with_media(MediaKind::Disk);
		assert!(!Xfs.identify(&Volume::whole(&disk)));
	}

	#[test]
	fn test_partition_bounds() {
		let image = sample();
		assert!(Xfs.identify(&Volume::new(&image, Partition::new(0, 0))));
		assert!(!Xfs.identify(&Volume::new(&image, Partition::new(1, 31))));
	}

	#[test]
	fn test_odd_block_size_warns() {
		let mut image = builder(0, 512, Endian::Big);
		image.field(0, &SUPERBLOCK, "blocksize", 3000).field(0, &SUPERBLOCK, "inprogress", 1);
		let info = Xfs.information(&Volume::whole(&image.build()), None).unwrap();
		assert!(info.text.contains("WARNING"));
		assert!(info.metadata.dirty);
	}
}
