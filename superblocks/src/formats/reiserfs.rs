use bytestruct::{int_enum, record, RecordDescriptor};

use super::{check_count, finish};
use crate::{
	error::ProbeError,
	normalize::{optional_text, Encoding, Report, StringKind, VolumeInfo},
	resolve::{Signature, LITTLE},
	scan::{scan, Found, Layout},
	types::{Filesystem, Information, Volume},
};

const REISERFS_MAGIC: &[u8] = b"ReIsErFs\0\0";
const REISER2FS_MAGIC: &[u8] = b"ReIsEr2Fs\0";
/// 3.6 with a relocated or non-standard journal.
const REISER3FS_MAGIC: &[u8] = b"ReIsEr3Fs\0";

/// Format version that added the label and UUID.
const FORMAT_3_6: u64 = 2;
const VALID_FS: u64 = 1;

int_enum! {
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub enum DirectoryHash: u32 {
		Tea = 1 => "tea",
		Yura = 2 => "yura",
		R5 = 3 => "r5",
	}
}

record! {
	pub static SUPERBLOCK: "ReiserFS superblock", size = 0x74; {
		block_count: U32 @ 0x00,
		free_blocks: U32 @ 0x04,
		root_block: U32 @ 0x08,
		journal_first_block: U32 @ 0x0C,
		journal_device: U32 @ 0x10,
		journal_size: U32 @ 0x14,
		blocksize: U16 @ 0x2C,
		oid_maxsize: U16 @ 0x2E,
		oid_cursize: U16 @ 0x30,
		umount_state: U16 @ 0x32,
		magic: Bytes(10) @ 0x34,
		fs_state: U16 @ 0x3E,
		hash_function: U32 @ 0x40,
		tree_height: U16 @ 0x44,
		bmap_nr: U16 @ 0x46,
		version: U16 @ 0x48,
		reserved_for_journal: U16 @ 0x4A,
		inode_generation: U32 @ 0x4C,
		flags: U32 @ 0x50,
		uuid: Uuid @ 0x54,
		label: Bytes(16) @ 0x64,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&SUPERBLOCK];

static LAYOUT: Layout = Layout {
	record: &SUPERBLOCK,
	// 3.6 moved the superblock to 64KiB; 3.5 keeps it at 8KiB.
	locations: &[65536, 8192],
	optical_offsets: &[],
	signature: Signature::Bytes {
		field: "magic",
		values: &[REISERFS_MAGIC, REISER2FS_MAGIC, REISER3FS_MAGIC],
	},
	orders: LITTLE,
};

pub struct ReiserFs;

impl ReiserFs {
	fn find(&self, volume: &Volume) -> Option<Found> {
		scan(volume, &LAYOUT, |record, _| {
			matches!(record.u64("blocksize"), Ok(size) if size >= 512 && size.is_power_of_two())
		})
	}
}

impl Filesystem for ReiserFs {
	fn name(&self) -> &'static str {
		"reiserfs"
	}

	fn description(&self) -> &'static str {
		"Reiser filesystem"
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

		let kind = match record.bytes("magic")? {
			REISERFS_MAGIC => "ReiserFS 3.5",
			_ => "ReiserFS 3.6",
		};

		let mut report = Report::new(kind);
		if record.bytes("magic")? == REISER3FS_MAGIC {
			report.line("Non-standard journal");
		}
		report.line(format_args!("Superblock at byte {}", found.candidate.byte_offset));
		report.line(format_args!("Tree height: {}", record.u64("tree_height")?));
		if let Ok(hash) = DirectoryHash::try_from(record.u32("hash_function")?) {
			report.line(format_args!("Directory hash: {}", hash));
		}

		let total = record.u64("block_count")?;
		let free = record.u64("free_blocks")?;
		check_count(&mut report, "free blocks", total, free);

		let mut info = VolumeInfo::new(kind, record.u32("blocksize")?, total);
		info.free_clusters = Some(free.min(total));
		info.dirty = record.u64("umount_state")? != VALID_FS;

		if record.u64("version")? >= FORMAT_3_6 {
			info.volume_name = optional_text(record.bytes("label")?, StringKind::NulTerminated, encoding.unwrap_or(Encoding::Utf8));
			let uuid = record.uuid("uuid")?;
			if !uuid.is_nil() {
				info.volume_serial = Some(uuid.to_string());
			}
		}

		Ok(finish(report, info))
	}
}

#[cfg(test)]
fn builder(at: u64, magic: &[u8], version: u64) -> crate::testing::ImageBuilder {
	let mut image = crate::testing::ImageBuilder::new(136, 512);
	image
		.field(at, &SUPERBLOCK, "block_count", 65536)
		.field(at, &SUPERBLOCK, "free_blocks", 60000)
		.field(at, &SUPERBLOCK, "blocksize", 4096)
		.field(at, &SUPERBLOCK, "umount_state", VALID_FS)
		.text(at, &SUPERBLOCK, "magic", magic)
		.field(at, &SUPERBLOCK, "hash_function", 3)
		.field(at, &SUPERBLOCK, "tree_height", 2)
		.field(at, &SUPERBLOCK, "version", version)
		.bytes(at + 0x54, &[0x5A; 16])
		.text(at, &SUPERBLOCK, "label", b"home");
	image
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	builder(65536, REISER2FS_MAGIC, FORMAT_3_6).build()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_identify_3_6() {
		let image = sample();
		let volume = Volume::whole(&image);
		assert!(ReiserFs.identify(&volume));

		let info = ReiserFs.information(&volume, None).unwrap();
		assert_eq!(info.metadata.filesystem_type, "ReiserFS 3.6");
		assert_eq!(info.metadata.cluster_size, 4096);
		assert_eq!(info.metadata.clusters, 65536);
		assert_eq!(info.metadata.free_clusters, Some(60000));
		assert_eq!(info.metadata.volume_name.as_deref(), Some("home"));
		assert_eq!(info.metadata.volume_serial.as_deref(), Some("5a5a5a5a-5a5a-5a5a-5a5a-5a5a5a5a5a5a"));
		assert!(!info.metadata.dirty);
		assert!(info.text.contains("Directory hash: r5"));
	}

	#[test]
	fn test_old_format_at_8k() {
		let image = builder(8192, REISERFS_MAGIC, 0).build();
		let info = ReiserFs.information(&Volume::whole(&image), None).unwrap();
		assert_eq!(info.metadata.filesystem_type, "ReiserFS 3.5");
		assert!(info.text.contains("Superblock at byte 8192"));
		assert_eq!(info.metadata.volume_name, None);
		assert_eq!(info.metadata.volume_serial, None);
	}

	#[test]
	fn test_unclean_unmount() {
		let mut image = builder(65536, REISER3FS_MAGIC, FORMAT_3_6);
		image.field(65536, &SUPERBLOCK, "umount_state", 2);
		let info = ReiserFs.information(&Volume::whole(&image.build()), None).unwrap();
		assert!(info.metadata.dirty);
		assert!(info.text.contains("Non-standard journal"));
	}

	#[test]
	fn test_image_too_small_for_new_location() {
		let mut image = crate::testing::ImageBuilder::new(64, 512);
		image
			.field(8192, &SUPERBLOCK, "blocksize", 4096)
			.text(8192, &SUPERBLOCK, "magic", REISERFS_MAGIC);
		assert!(!ReiserFs.identify(&Volume::whole(&image.build())));
	}

	#[test]
	fn test_zeroed_magic() {
		let mut image = builder(65536, REISER2FS_MAGIC, FORMAT_3_6);
		image.text(65536, &SUPERBLOCK, "magic", b"");
		assert!(!ReiserFs.identify(&Volume::whole(&image.build())));
	}
}
