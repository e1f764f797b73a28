use bytestruct::{record, RecordDescriptor};

use super::finish;
use crate::{
	error::ProbeError,
	normalize::{Encoding, Report, VolumeInfo},
	resolve::{Signature, EITHER},
	scan::{scan, Found, Layout},
	types::{Filesystem, Information, Volume},
};

pub const MINIX_V1_MAGIC: u64 = 0x137F;
/// Version 1 with 30 character names.
pub const MINIX_V1_MAGIC2: u64 = 0x138F;
pub const MINIX_V2_MAGIC: u64 = 0x2468;
pub const MINIX_V2_MAGIC2: u64 = 0x2478;
pub const MINIX_V3_MAGIC: u64 = 0x4D5A;

record! {
	pub static SUPERBLOCK: "Minix v1/v2 superblock", size = 0x18; {
		ninodes: U16 @ 0x00,
		nzones: U16 @ 0x02,
		imap_blocks: U16 @ 0x04,
		zmap_blocks: U16 @ 0x06,
		firstdatazone: U16 @ 0x08,
		log_zone_size: U16 @ 0x0A,
		max_size: U32 @ 0x0C,
		magic: U16 @ 0x10,
		state: U16 @ 0x12,
		zones: U32 @ 0x14,
	}
}

record! {
	pub static SUPERBLOCK_V3: "Minix v3 superblock", size = 0x20; {
		ninodes: U32 @ 0x00,
		imap_blocks: U16 @ 0x06,
		zmap_blocks: U16 @ 0x08,
		firstdatazone: U16 @ 0x0A,
		log_zone_size: U16 @ 0x0C,
		max_size: U32 @ 0x10,
		zones: U32 @ 0x14,
		magic: U16 @ 0x18,
		blocksize: U16 @ 0x1C,
		disk_version: U8 @ 0x1E,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&SUPERBLOCK, &SUPERBLOCK_V3];

static LAYOUT: Layout = Layout {
	record: &SUPERBLOCK,
	locations: &[0x400],
	optical_offsets: &[],
	signature: Signature::Int {
		field: "magic",
		values: &[MINIX_V1_MAGIC, MINIX_V1_MAGIC2, MINIX_V2_MAGIC, MINIX_V2_MAGIC2],
	},
	orders: EITHER,
};

static LAYOUT_V3: Layout = Layout {
	record: &SUPERBLOCK_V3,
	locations: &[0x400],
	optical_offsets: &[],
	signature: Signature::Int {
		field: "magic",
		values: &[MINIX_V3_MAGIC],
	},
	orders: EITHER,
};

pub struct Minix;

impl Minix {
	fn find(&self, volume: &Volume) -> Option<Found> {
		scan(volume, &LAYOUT, |record, _| matches!(record.u64("log_zone_size"), Ok(log) if log <= 8)).or_else(|| {
			scan(volume, &LAYOUT_V3, |record, _| {
				matches!(record.u64("blocksize"), Ok(size) if size >= 512 && size.is_power_of_two())
			})
		})
	}
}

impl Filesystem for Minix {
	fn name(&self) -> &'static str {
		"minix"
	}

	fn description(&self) -> &'static str {
		"Minix filesystem"
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

		let magic = record.u64("magic")?;
		let (version, name_length) = match magic {
			MINIX_V1_MAGIC => (1, 14),
			MINIX_V1_MAGIC2 => (1, 30),
			MINIX_V2_MAGIC => (2, 14),
			MINIX_V2_MAGIC2 => (2, 30),
			_ => (3, 60),
		};

		let log_zone_size = record.u32("log_zone_size")?;
		let (cluster_size, clusters) = match version {
			1 => (1024 << log_zone_size, record.u64("nzones")?),
			2 => (1024 << log_zone_size, record.u64("zones")?),
			_ => (record.u32("blocksize")?, record.u64("zones")?),
		};

		let mut report = Report::new(format_args!("{} v{}", self.description(), version));
		report.line(format_args!("Byte order: {}", found.endian.name()));
		report.line(format_args!("Maximum name length: {}", name_length));
		report.line(format_args!("Inodes: {}", record.u64("ninodes")?));

		let info = VolumeInfo::new(format!("Minix v{}", version), cluster_size, clusters);
		Ok(finish(report, info))
	}
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	v2(bytestruct::Endian::Little).build()
}

#[cfg(test)]
fn v2(endian: bytestruct::Endian) -> crate::testing::ImageBuilder {
	let mut image = crate::testing::ImageBuilder::new(4, 512);
	image
		.endian(endian)
		.field(0x400, &SUPERBLOCK, "ninodes", 480)
		.field(0x400, &SUPERBLOCK, "magic", MINIX_V2_MAGIC2)
		.field(0x400, &SUPERBLOCK, "state", 1)
		.field(0x400, &SUPERBLOCK, "zones", 1440);
	image
}

#[cfg(test)]
mod tests {
	use bytestruct::Endian;

	use super::*;
	use crate::testing::ImageBuilder;

	#[test]
	fn test_v2() {
		let image = sample();
		let volume = Volume::whole(&image);
		assert!(Minix.identify(&volume));

		let info = Minix.information(&volume, None).unwrap();
		assert_eq!(info.metadata.filesystem_type, "Minix v2");
		assert_eq!(info.metadata.cluster_size, 1024);
		assert_eq!(info.metadata.clusters, 1440);
		assert_eq!(info.metadata.free_clusters, None);
		assert!(info.text.contains("Maximum name length: 30"));
	}

	#[test]
	fn test_big_endian_v1() {
		let mut image = ImageBuilder::new(4, 512);
		image
			.endian(Endian::Big)
			.field(0x400, &SUPERBLOCK, "magic", MINIX_V1_MAGIC)
			.field(0x400, &SUPERBLOCK, "nzones", 360)
			.field(0x400, &SUPERBLOCK, "log_zone_size", 1);
		let info = Minix.information(&Volume::whole(&image.build()), None).unwrap();
		assert_eq!(info.metadata.filesystem_type, "Minix v1");
		assert_eq!(info.metadata.cluster_size, 2048);
		assert_eq!(info.metadata.clusters, 360);
		assert!(info.text.contains("big-endian"));
	}

	#[test]
	fn test_v3() {
		let mut image = ImageBuilder::new(4, 512);
		image
			.field(0x400, &SUPERBLOCK_V3, "magic", MINIX_V3_MAGIC)
			.field(0x400, &SUPERBLOCK_V3, "blocksize", 4096)
			.field(0x400, &SUPERBLOCK_V3, "zones", 9000);
		let info = Minix.information(&Volume::whole(&image.build()), None).unwrap();
		assert_eq!(info.metadata.filesystem_type, "Minix v3");
		assert_eq!(info.metadata.cluster_size, 4096);
		assert_eq!(info.metadata.clusters, 9000);
	}

	#[test]
	fn test_zeroed_magic() {
		let mut image = v2(Endian::Little);
		image.field(0x400, &SUPERBLOCK, "magic", 0);
		assert!(!Minix.identify(&Volume::whole(&image.build())));
	}
}
