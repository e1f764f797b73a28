use bytestruct::{record, RecordDescriptor};

use super::finish;
use crate::{
	error::ProbeError,
	normalize::{optional_text, Encoding, Report, StringKind, VolumeInfo},
	resolve::{Signature, LITTLE},
	scan::{scan, Found, Layout},
	types::{Filesystem, Information, Volume},
};

pub const F2FS_MAGIC: u64 = 0xF2F52010;

record! {
	pub static SUPERBLOCK: "F2FS superblock", size = 0x27C; {
		magic: U32 @ 0x00,
		major_ver: U16 @ 0x04,
		minor_ver: U16 @ 0x06,
		log_sectorsize: U32 @ 0x08,
		log_sectors_per_block: U32 @ 0x0C,
		log_blocksize: U32 @ 0x10,
		log_blocks_per_seg: U32 @ 0x14,
		segs_per_sec: U32 @ 0x18,
		secs_per_zone: U32 @ 0x1C,
		block_count: U64 @ 0x24,
		section_count: U32 @ 0x2C,
		segment_count: U32 @ 0x30,
		uuid: Uuid @ 0x6C,
		volume_name: Bytes(512) @ 0x7C,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&SUPERBLOCK];

static LAYOUT: Layout = Layout {
	record: &SUPERBLOCK,
	locations: &[0x400],
	optical_offsets: &[],
	signature: Signature::Int {
		field: "magic",
		values: &[F2FS_MAGIC],
	},
	orders: LITTLE,
};

pub struct F2fs;

impl F2fs {
	fn find(&self, volume: &Volume) -> Option<Found> {
		if !(512..=4096).contains(&volume.sector_size()) {
			return None;
		}

		scan(volume, &LAYOUT, |record, _| matches!(record.u64("log_blocksize"), Ok(log) if (9..=16).contains(&log)))
	}
}

impl Filesystem for F2fs {
	fn name(&self) -> &'static str {
		"f2fs"
	}

	fn description(&self) -> &'static str {
		"F2FS filesystem"
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

		let mut report = Report::new(self.description());
		report.line(format_args!("Version: {}.{}", record.u64("major_ver")?, record.u64("minor_ver")?));
		report.line(format_args!("Segments: {}", record.u64("segment_count")?));

		let mut info = VolumeInfo::new(self.description(), 1 << record.u32("log_blocksize")?, record.u64("block_count")?);
		info.volume_name = optional_text(record.bytes("volume_name")?, StringKind::NulTerminated, Encoding::Utf16Le);
		info.volume_serial = Some(record.uuid("uuid")?.to_string());

		Ok(finish(report, info))
	}
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	builder().build()
}

#[cfg(test)]
fn builder() -> crate::testing::ImageBuilder {
	let label: Vec<u8> = "Ñandú".encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect();
	let mut image = crate::testing::ImageBuilder::new(4, 512);
	image
		.field(0x400, &SUPERBLOCK, "magic", F2FS_MAGIC)
		.field(0x400, &SUPERBLOCK, "major_ver", 1)
		.field(0x400, &SUPERBLOCK, "minor_ver", 16)
		.field(0x400, &SUPERBLOCK, "log_sectorsize", 9)
		.field(0x400, &SUPERBLOCK, "log_blocksize", 12)
		.field(0x400, &SUPERBLOCK, "block_count", 131072)
		.field(0x400, &SUPERBLOCK, "segment_count", 255)
		.text(0x400, &SUPERBLOCK, "volume_name", &label);
	image
}
