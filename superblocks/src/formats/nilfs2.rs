use bytestruct::{record, RecordDescriptor};

use super::finish;
use crate::{
	error::ProbeError,
	normalize::{optional_text, unix, Encoding, Report, StringKind, VolumeInfo},
	resolve::{Signature, LITTLE},
	scan::{scan, Found, Layout},
	types::{Filesystem, Information, Volume},
};

pub const NILFS_MAGIC: u64 = 0x3434;
/// `state` bit of a cleanly unmounted volume.
const NILFS_VALID_FS: u64 = 0x0001;

record! {
	pub static SUPERBLOCK: "NILFS2 superblock", size = 0xF8; {
		rev_level: U32 @ 0x00,
		minor_rev_level: U16 @ 0x04,
		magic: U16 @ 0x06,
		bytes: U16 @ 0x08,
		flags: U16 @ 0x0A,
		crc_seed: U32 @ 0x0C,
		sum: U32 @ 0x10,
		log_block_size: U32 @ 0x14,
		nsegments: U64 @ 0x18,
		dev_size: U64 @ 0x20,
		first_data_block: U64 @ 0x28,
		blocks_per_segment: U32 @ 0x30,
		last_cno: U64 @ 0x38,
		free_blocks_count: U64 @ 0x50,
		ctime: U64 @ 0x58,
		mtime: U64 @ 0x60,
		wtime: U64 @ 0x68,
		mnt_count: U16 @ 0x70,
		state: U16 @ 0x74,
		uuid: Uuid @ 0x98,
		volume_name: Bytes(80) @ 0xA8,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&SUPERBLOCK];

static LAYOUT: Layout = Layout {
	record: &SUPERBLOCK,
	locations: &[0x400],
	optical_offsets: &[],
	signature: Signature::Int {
		field: "magic",
		values: &[NILFS_MAGIC],
	},
	orders: LITTLE,
};

pub struct Nilfs2;

impl Nilfs2 {
	fn find(&self, volume: &Volume) -> Option<Found> {
		// Block sizes run from 1KiB to 64KiB.
		scan(volume, &LAYOUT, |record, _| matches!(record.u64("log_block_size"), Ok(log) if log <= 6))
	}
}

impl Filesystem for Nilfs2 {
	fn name(&self) -> &'static str {
		"nilfs2"
	}

	fn description(&self) -> &'static str {
		"NILFS2 filesystem"
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

		let block_size: u32 = 1 << (record.u32("log_block_size")? + 10);
		let clusters = record.u64("dev_size")? / block_size as u64;
		let free = record.u64("free_blocks_count")?;

		let mut report = Report::new(self.description());
		report.line(format_args!("Revision: {}.{}", record.u64("rev_level")?, record.u64("minor_rev_level")?));
		report.line(format_args!("Segments: {}", record.u64("nsegments")?));
		report.line(format_args!("Last checkpoint: {}", record.u64("last_cno")?));
		if free > clusters {
			report.corrupt(format_args!("{} free blocks on a {} block device", free, clusters));
		}

		let mut info = VolumeInfo::new(self.description(), block_size, clusters);
		info.free_clusters = Some(free.min(clusters));
		info.volume_name = optional_text(record.bytes("volume_name")?, StringKind::NulTerminated, encoding.unwrap_or(Encoding::Utf8));
		info.volume_serial = Some(record.uuid("uuid")?.to_string());
		info.creation_date = unix(record.u64("ctime")? as i64);
		info.modification_date = unix(record.u64("wtime")? as i64);
		info.dirty = record.u64("state")? & NILFS_VALID_FS == 0;

		Ok(finish(report, info))
	}
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	builder().build()
}

#[cfg(test)]
fn builder() -> crate::testing::ImageBuilder {
	let mut image = crate::testing::ImageBuilder::new(4, 512);
	image
		.field(0x400, &SUPERBLOCK, "rev_level", 2)
		.field(0x400, &SUPERBLOCK, "magic", NILFS_MAGIC)
		.field(0x400, &SUPERBLOCK, "log_block_size", 2)
		.field(0x400, &SUPERBLOCK, "dev_size", 1 << 30)
		.field(0x400, &SUPERBLOCK, "free_blocks_count", 200000)
		.field(0x400, &SUPERBLOCK, "ctime", 1_400_000_000)
		.field(0x400, &SUPERBLOCK, "wtime", 1_400_000_500)
		.field(0x400, &SUPERBLOCK, "state", NILFS_VALID_FS)
		.text(0x400, &SUPERBLOCK, "volume_name", b"logfs");
	image
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_identify() {
		let image = sample();
		let volume = Volume::whole(&image);
		assert!(Nilfs2.identify(&volume));

		let info = Nilfs2.information(&volume, None).unwrap();
		assert_eq!(info.metadata.cluster_size, 4096);
		assert_eq!(info.metadata.clusters, 262144);
		assert_eq!(info.metadata.free_clusters, Some(200000));
		assert_eq!(info.metadata.volume_name.as_deref(), Some("logfs"));
		assert_eq!(info.metadata.creation_date.unwrap().timestamp(), 1_400_000_000);
		assert!(!info.metadata.dirty);
	}

	#[test]
	fn test_unclean_volume() {
		let mut image = builder();
		image.field(0x400, &SUPERBLOCK, "state", 0);
		assert!(Nilfs2.information(&Volume::whole(&image.build()), None).unwrap().metadata.dirty);
	}

	#[test]
	fn test_zeroed_magic() {
		let mut image = builder();
		image.field(0x400, &SUPERBLOCK, "magic", 0);
		assert!(!Nilfs2.identify(&Volume::whole(&image.build())));
	}
}
