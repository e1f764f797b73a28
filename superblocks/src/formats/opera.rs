use bytestruct::{record, RecordDescriptor};

use super::finish;
use crate::{
	error::ProbeError,
	normalize::{optional_text, Encoding, Report, StringKind, VolumeInfo},
	resolve::{Signature, BIG},
	scan::{scan, Found, Layout},
	types::{Filesystem, Information, Volume},
};

const SYNC_BYTES: &[u8] = &[0x5A; 5];
const RECORD_TYPE: u64 = 1;
const RECORD_VERSION: u64 = 1;

record! {
	pub static DISC_LABEL: "Opera disc label", size = 0x68; {
		record_type: U8 @ 0x00,
		sync: Bytes(5) @ 0x01,
		record_version: U8 @ 0x06,
		flags: U8 @ 0x07,
		comment: Bytes(32) @ 0x08,
		label: Bytes(32) @ 0x28,
		id: U32 @ 0x48,
		block_size: U32 @ 0x4C,
		block_count: U32 @ 0x50,
		root_dir_id: U32 @ 0x54,
		root_dir_blocks: U32 @ 0x58,
		root_dir_block_size: U32 @ 0x5C,
		last_root_dir_copy: U32 @ 0x60,
		root_dir_copy: U32 @ 0x64,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&DISC_LABEL];

static LAYOUT: Layout = Layout {
	record: &DISC_LABEL,
	locations: &[0],
	optical_offsets: &[],
	signature: Signature::Bytes {
		field: "sync",
		values: &[SYNC_BYTES],
	},
	orders: BIG,
};

pub struct Opera;

impl Opera {
	fn find(&self, volume: &Volume) -> Option<Found> {
		scan(volume, &LAYOUT, |record, _| {
			matches!(record.u64("record_type"), Ok(RECORD_TYPE))
				&& matches!(record.u64("record_version"), Ok(RECORD_VERSION))
				&& matches!(record.u64("block_size"), Ok(size) if size > 0)
		})
	}
}

impl Filesystem for Opera {
	fn name(&self) -> &'static str {
		"opera"
	}

	fn description(&self) -> &'static str {
		"Opera filesystem"
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
		let encoding = encoding.unwrap_or(Encoding::Latin1);

		let block_size = record.u32("block_size")?;

		let mut report = Report::new(self.description());
		if let Some(comment) = optional_text(record.bytes("comment")?, StringKind::NulTerminated, encoding) {
			report.line(format_args!("Comment: {}", comment));
		}
		report.line(format_args!("Root directory: {} blocks", record.u64("root_dir_blocks")?));
		if block_size != volume.sector_size() {
			report.warn(format_args!(
				"block size {} does not match the {} byte sectors of the source",
				block_size,
				volume.sector_size()
			));
		}

		let mut info = VolumeInfo::new(self.description(), block_size, record.u64("block_count")?);
		info.volume_name = optional_text(record.bytes("label")?, StringKind::NulTerminated, encoding);
		info.volume_serial = Some(format!("{:08X}", record.u64("id")?));

		Ok(finish(report, info))
	}
}

#[cfg(test)]
fn builder(sector_size: u32) -> crate::testing::ImageBuilder {
	let mut image = crate::testing::ImageBuilder::new(4, sector_size);
	image
		.endian(bytestruct::Endian::Big)
		.field(0, &DISC_LABEL, "record_type", RECORD_TYPE)
		.text(0, &DISC_LABEL, "sync", SYNC_BYTES)
		.field(0, &DISC_LABEL, "record_version", RECORD_VERSION)
		.text(0, &DISC_LABEL, "comment", b"opera disc")
		.text(0, &DISC_LABEL, "label", b"cd-rom")
		.field(0, &DISC_LABEL, "id", 0x3D0_0001)
		.field(0, &DISC_LABEL, "block_size", 2048)
		.field(0, &DISC_LABEL, "block_count", 330000)
		.field(0, &DISC_LABEL, "root_dir_blocks", 1);
	image
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	builder(2048).build()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_identify() {
		let image = sample();
		let volume = Volume::whole(&image);
		assert!(Opera.identify(&volume));

		let info = Opera.information(&volume, None).unwrap();
		assert_eq!(info.metadata.cluster_size, 2048);
		assert_eq!(info.metadata.clusters, 330000);
		assert_eq!(info.metadata.volume_name.as_deref(), Some("cd-rom"));
		assert_eq!(info.metadata.volume_serial.as_deref(), Some("03D00001"));
		assert!(info.text.contains("Comment: opera disc"));
		assert!(!info.text.contains("WARNING"));
	}

	#[test]
	fn test_block_size_mismatch_warns() {
		let image = builder(512).build();
		let info = Opera.information(&Volume::whole(&image), None).unwrap();
		assert!(info.text.contains("WARNING: block size 2048 does not match the 512 byte sectors"));
	}

	#[test]
	fn test_record_version_must_be_one() {
		let mut image = builder(2048);
		image.field(0, &DISC_LABEL, "record_version", 2);
		assert!(!Opera.identify(&Volume::whole(&image.build())));
	}

	#[test]
	fn test_zeroed_magic() {
		let mut image = builder(2048);
		image.text(0, &DISC_LABEL, "sync", b"");
		assert!(!Opera.identify(&Volume::whole(&image.build())));
	}
}
