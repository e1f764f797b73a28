use bytestruct::{record, RecordDescriptor};

use super::finish;
use crate::{
	error::ProbeError,
	normalize::{optional_text, unix, Encoding, Report, StringKind, VolumeInfo},
	resolve::{Signature, EITHER},
	scan::{scan, Found, Layout},
	types::{Filesystem, Information, Volume},
};

/// Free fragments from free whole blocks plus loose fragments, or `None` if the counts overflow.
fn free_fragments(blocks: i64, frag: i64, fragments: i64) -> Option<u64> {
	let free = blocks.checked_mul(frag)?.checked_add(fragments)?;
	Some(free.max(0) as u64)
}

pub const UFS1_MAGIC: u64 = 0x00011954;
pub const UFS2_MAGIC: u64 = 0x19540119;
pub const BORDERWARE_MAGIC: u64 = 0x0F242697;
/// Left behind by a newfs or growfs that never finished.
pub const INCOMPLETE_MAGIC: u64 = 0x19960408;

record! {
	pub static SUPERBLOCK: "UFS superblock", size = 0x560; {
		old_time: I32 @ 0x20,
		old_size: I32 @ 0x24,
		old_dsize: I32 @ 0x28,
		ncg: I32 @ 0x2C,
		bsize: I32 @ 0x30,
		fsize: I32 @ 0x34,
		frag: I32 @ 0x38,
		ipg: I32 @ 0xB8,
		old_ndir: I32 @ 0xC0,
		old_nbfree: I32 @ 0xC4,
		old_nifree: I32 @ 0xC8,
		old_nffree: I32 @ 0xCC,
		fmod: U8 @ 0xD0,
		clean: U8 @ 0xD1,
		ronly: U8 @ 0xD2,
		fsmnt: Bytes(468) @ 0xD4,
		volname: Bytes(32) @ 0x2A8,
		swuid: U64 @ 0x2C8,
		ndir: I64 @ 0x3F0,
		nbfree: I64 @ 0x3F8,
		nifree: I64 @ 0x400,
		nffree: I64 @ 0x408,
		time: I64 @ 0x430,
		size: I64 @ 0x438,
		dsize: I64 @ 0x440,
		magic: U32 @ 0x55C,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&SUPERBLOCK];

static LAYOUT: Layout = Layout {
	record: &SUPERBLOCK,
	// Floppies, UFS1, UFS2 and the "piggyback" location used on some UFS2 volumes.
	locations: &[0, 8192, 65536, 262144],
	optical_offsets: &[],
	signature: Signature::Int {
		field: "magic",
		values: &[UFS1_MAGIC, UFS2_MAGIC, BORDERWARE_MAGIC, INCOMPLETE_MAGIC],
	},
	orders: EITHER,
};

pub struct Ufs;

impl Ufs {
	fn find(&self, volume: &Volume) -> Option<Found> {
		scan(volume, &LAYOUT, |record, _| {
			matches!(record.i64("fsize"), Ok(size) if size > 0) && matches!(record.i64("frag"), Ok(frag) if frag > 0)
		})
	}
}

impl Filesystem for Ufs {
	fn name(&self) -> &'static str {
		"ufs"
	}

	fn description(&self) -> &'static str {
		"UNIX File System"
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

		let magic = record.u64("magic")?;
		let fsize = record.i64("fsize")? as u32;
		let frag = record.i64("frag")?;
		let inodes = (record.i64("ipg")? * record.i64("ncg")?).max(0) as u64;

		let mut report = Report::new(self.description());
		report.line(format_args!("Byte order: {}", found.endian.name()));
		report.line(format_args!("Superblock at byte {}", found.candidate.byte_offset));
		report.line(format_args!("Block size: {} bytes", record.i64("bsize")?));
		if let Some(mount) = optional_text(record.bytes("fsmnt")?, StringKind::NulTerminated, Encoding::Utf8) {
			report.line(format_args!("Last mounted on: {}", mount));
		}

		let mut info = match magic {
			UFS2_MAGIC => {
				let mut info = VolumeInfo::new("UFS2", fsize, record.i64("size")?.max(0) as u64);
				info.free_clusters = free_fragments(record.i64("nbfree")?, frag, record.i64("nffree")?);
				info.files = Some(inodes.saturating_sub(record.i64("nifree")?.max(0) as u64));
				info.modification_date = unix(record.i64("time")?);
				info.volume_name = optional_text(record.bytes("volname")?, StringKind::NulTerminated, encoding.unwrap_or(Encoding::Utf8));
				match record.u64("swuid")? {
					0 => {}
					id => info.volume_serial = Some(format!("{:016X}", id)),
				}
				info
			}
			_ => {
				let kind = if magic == BORDERWARE_MAGIC { "BorderWare UFS" } else { "UFS1" };
				let mut info = VolumeInfo::new(kind, fsize, record.i64("old_size")?.max(0) as u64);
				info.free_clusters = free_fragments(record.i64("old_nbfree")?, frag, record.i64("old_nffree")?);
				info.files = Some(inodes.saturating_sub(record.i64("old_nifree")?.max(0) as u64));
				info.modification_date = unix(record.i64("old_time")?);
				info
			}
		};

		if info.free_clusters.is_none() {
			report.corrupt("free block count overflows");
		}
		if magic == INCOMPLETE_MAGIC {
			report.corrupt("the filesystem was never completely initialized");
		}
		if info.free_clusters.is_some_and(|free| free > info.clusters) {
			report.corrupt("more free fragments than fragments");
		}
		info.dirty = record.u64("clean")? == 0;

		Ok(finish(report, info))
	}
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	ufs2(bytestruct::Endian::Little).build()
}

#[cfg(test)]
fn ufs2(endian: bytestruct::Endian) -> crate::testing::ImageBuilder {
	const AT: u64 = 65536;
	let mut image = crate::testing::ImageBuilder::new((AT as usize + 0x800) / 512, 512);
	image
		.endian(endian)
		.field(AT, &SUPERBLOCK, "magic", UFS2_MAGIC)
		.field(AT, &SUPERBLOCK, "ncg", 4)
		.field(AT, &SUPERBLOCK, "ipg", 256)
		.field(AT, &SUPERBLOCK, "bsize", 32768)
		.field(AT, &SUPERBLOCK, "fsize", 4096)
		.field(AT, &SUPERBLOCK, "frag", 8)
		.field(AT, &SUPERBLOCK, "size", 100000)
		.field(AT, &SUPERBLOCK, "nbfree", 10000)
		.field(AT, &SUPERBLOCK, "nffree", 12)
		.field(AT, &SUPERBLOCK, "nifree", 1000)
		.field(AT, &SUPERBLOCK, "time", 1_650_000_000)
		.field(AT, &SUPERBLOCK, "clean", 1)
		.text(AT, &SUPERBLOCK, "volname", b"usr");
	image
}

#[cfg(test)]
mod tests {
	use bytestruct::Endian;

	use super::*;
	use crate::testing::ImageBuilder;

	#[test]
	fn test_ufs2() {
		let image = sample();
		let volume = Volume::whole(&image);
		assert!(Ufs.identify(&volume));

		let info = Ufs.information(&volume, None).unwrap();
		assert_eq!(info.metadata.filesystem_type, "UFS2");
		assert_eq!(info.metadata.cluster_size, 4096);
		assert_eq!(info.metadata.clusters, 100000);
		assert_eq!(info.metadata.free_clusters, Some(80012));
		assert_eq!(info.metadata.files, Some(24));
		assert_eq!(info.metadata.volume_name.as_deref(), Some("usr"));
		assert_eq!(info.metadata.modification_date.unwrap().timestamp(), 1_650_000_000);
		assert!(!info.metadata.dirty);
	}

	#[test]
	fn test_big_endian_ufs1() {
		let mut image = ImageBuilder::new(32, 512);
		image
			.endian(Endian::Big)
			.field(8192, &SUPERBLOCK, "magic", UFS1_MAGIC)
			.field(8192, &SUPERBLOCK, "fsize", 1024)
			.field(8192, &SUPERBLOCK, "frag", 8)
			.field(8192, &SUPERBLOCK, "old_size", 2880)
			.field(8192, &SUPERBLOCK, "old_nbfree", 100)
			.field(8192, &SUPERBLOCK, "old_nffree", 3);
		let info = Ufs.information(&Volume::whole(&image.build()), None).unwrap();
		assert_eq!(info.metadata.filesystem_type, "UFS1");
		assert_eq!(info.metadata.clusters, 2880);
		assert_eq!(info.metadata.free_clusters, Some(803));
		assert!(info.metadata.dirty);
		assert!(info.text.contains("big-endian"));
	}

	#[test]
	fn test_incomplete_newfs_warns() {
		let mut image = ufs2(Endian::Little);
		image.field(65536, &SUPERBLOCK, "magic", INCOMPLETE_MAGIC);
		let info = Ufs.information(&Volume::whole(&image.build()), None).unwrap();
		assert!(info.text.contains("never completely initialized"));
	}

	#[test]
	fn test_overflowing_free_count_warns() {
		let mut image = ufs2(Endian::Little);
		image.field(65536, &SUPERBLOCK, "nbfree", (i64::MAX / 4) as u64);
		let built = image.build();
		let volume = Volume::whole(&built);
		assert!(Ufs.identify(&volume));

		let info = Ufs.information(&volume, None).unwrap();
		assert_eq!(info.metadata.free_clusters, None);
		assert_eq!(info.metadata.clusters, 100000);
		assert!(info.text.contains("WARNING: superblock seems corrupt: free block count overflows"));
	}

	#[test]
	fn test_free_fragments() {
		assert_eq!(free_fragments(10, 8, 3), Some(83));
		assert_eq!(free_fragments(-5, 8, 3), Some(0));
		assert_eq!(free_fragments(i64::MAX / 4, 8, 0), None);
		assert_eq!(free_fragments(i64::MAX / 8, 8, i64::MAX), None);
	}

	#[test]
	fn test_zeroed_magic() {
		let mut image = ufs2(Endian::Big);
		image.field(65536, &SUPERBLOCK, "magic", 0);
		assert!(!Ufs.identify(&Volume::whole(&image.build())));
	}
}
