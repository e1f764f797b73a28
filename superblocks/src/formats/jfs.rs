use bytestruct::{record, RecordDescriptor};

use super::finish;
use crate::{
	error::ProbeError,
	normalize::{optional_text, unix_nanos, Encoding, Report, StringKind, VolumeInfo},
	resolve::{Signature, LITTLE},
	scan::{scan, Found, Layout},
	types::{Filesystem, Information, Volume},
};

record! {
	pub static SUPERBLOCK: "JFS superblock", size = 0xB8; {
		magic: Bytes(4) @ 0x00,
		version: U32 @ 0x04,
		size: I64 @ 0x08,
		bsize: I32 @ 0x10,
		l2bsize: I16 @ 0x14,
		pbsize: I32 @ 0x18,
		agsize: U32 @ 0x20,
		flag: U32 @ 0x24,
		state: U32 @ 0x28,
		time_sec: U32 @ 0x58,
		time_nsec: U32 @ 0x5C,
		fpack: Bytes(11) @ 0x65,
		uuid: Uuid @ 0x88,
		label: Bytes(16) @ 0x98,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&SUPERBLOCK];

static LAYOUT: Layout = Layout {
	record: &SUPERBLOCK,
	locations: &[0x8000],
	optical_offsets: &[],
	signature: Signature::Bytes {
		field: "magic",
		values: &[b"JFS1"],
	},
	orders: LITTLE,
};

pub struct Jfs;

impl Jfs {
	fn find(&self, volume: &Volume) -> Option<Found> {
		scan(volume, &LAYOUT, |record, _| {
			matches!(record.i64("bsize"), Ok(size) if size > 0) && matches!(record.i64("pbsize"), Ok(size) if size > 0)
		})
	}
}

impl Filesystem for Jfs {
	fn name(&self) -> &'static str {
		"jfs"
	}

	fn description(&self) -> &'static str {
		"JFS filesystem"
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

		let bsize = record.i64("bsize")?;
		let encoding = encoding.unwrap_or(Encoding::Utf8);

		let mut report = Report::new(self.description());
		report.line(format_args!("Version: {}", record.u64("version")?));

		// `size` counts physical blocks, not filesystem blocks.
		let size = record.i64("size")?.max(0) as u64;
		let clusters = match size.checked_mul(record.i64("pbsize")? as u64) {
			Some(bytes) => bytes / bsize as u64,
			None => {
				report.corrupt(format_args!("{} physical blocks overflow the volume size", size));
				volume.size_in_bytes() / bsize as u64
			}
		};

		let mut info = VolumeInfo::new(self.description(), bsize as u32, clusters);
		info.volume_name = optional_text(record.bytes("label")?, StringKind::NulTerminated, encoding)
			.or_else(|| optional_text(record.bytes("fpack").unwrap_or_default(), StringKind::NulTerminated, encoding));
		let uuid = record.uuid("uuid")?;
		if !uuid.is_nil() {
			info.volume_serial = Some(uuid.to_string());
		}
		info.modification_date = unix_nanos(record.u64("time_sec")? as i64, record.u32("time_nsec")?);
		info.dirty = record.u64("state")? != 0;

		Ok(finish(report, info))
	}
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	builder().build()
}

#[cfg(test)]
fn builder() -> crate::testing::ImageBuilder {
	let mut image = crate::testing::ImageBuilder::new(0x8200 / 512, 512);
	image
		.text(0x8000, &SUPERBLOCK, "magic", b"JFS1")
		.field(0x8000, &SUPERBLOCK, "version", 2)
		.field(0x8000, &SUPERBLOCK, "size", 204800)
		.field(0x8000, &SUPERBLOCK, "bsize", 4096)
		.field(0x8000, &SUPERBLOCK, "pbsize", 512)
		.field(0x8000, &SUPERBLOCK, "time_sec", 1_500_000_000)
		.field(0x8000, &SUPERBLOCK, "time_nsec", 250)
		.text(0x8000, &SUPERBLOCK, "fpack", b"jfsvol");
	image
}

#[cfg(test)]
mod tests {
	use chrono::Timelike;

	use super::*;

	#[test]
	fn test_identify() {
		let image = sample();
		let volume = Volume::whole(&image);
		assert!(Jfs.identify(&volume));

		let info = Jfs.information(&volume, None).unwrap();
		assert_eq!(info.metadata.cluster_size, 4096);
		assert_eq!(info.metadata.clusters, 25600);
		// No label, so the old pack name is used.
		assert_eq!(info.metadata.volume_name.as_deref(), Some("jfsvol"));
		assert_eq!(info.metadata.volume_serial, None);
		assert_eq!(info.metadata.modification_date.unwrap().nanosecond(), 250);
		assert!(!info.metadata.dirty);
	}

	#[test]
	fn test_label_wins() {
		let mut image = builder();
		image.text(0x8000, &SUPERBLOCK, "label", b"data").field(0x8000, &SUPERBLOCK, "state", 1);
		let info = Jfs.information(&Volume::whole(&image.build()), None).unwrap();
		assert_eq!(info.metadata.volume_name.as_deref(), Some("data"));
		assert!(info.metadata.dirty);
	}

	#[test]
	fn test_overflowing_size_falls_back_to_partition() {
		let mut image = builder();
		image.field(0x8000, &SUPERBLOCK, "size", (i64::MAX / 2) as u64);
		let built = image.build();
		let volume = Volume::whole(&built);
		assert!(Jfs.identify(&volume));

		let info = Jfs.information(&volume, None).unwrap();
		assert_eq!(info.metadata.clusters, 0x8200 / 4096);
		assert!(info.text.contains("WARNING: superblock seems corrupt"));
		assert!(info.text.contains("overflow the volume size"));
	}

	#[test]
	fn test_zeroed_magic() {
		let mut image = builder();
		image.text(0x8000, &SUPERBLOCK, "magic", b"");
		assert!(!Jfs.identify(&Volume::whole(&image.build())));
	}
}
