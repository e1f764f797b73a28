use bytestruct::{record, RecordDescriptor};

use super::finish;
use crate::{
	error::ProbeError,
	normalize::{optional_text, Encoding, Report, StringKind, VolumeInfo},
	resolve::{Signature, EITHER},
	scan::{scan, Found, Layout},
	types::{Filesystem, Information, Volume},
};

/// `HAMMER_FSBUF_VOLUME`. Volumes written on a big endian host read as its byte-swapped twin.
pub const HAMMER_MAGIC: u64 = 0xC8414D4DC5523031;
/// HAMMER allocates in 8MiB big-blocks.
const BIGBLOCK_SIZE: u32 = 8 << 20;

record! {
	pub static VOLUME_HEADER: "HAMMER volume header", size = 0x100; {
		signature: U64 @ 0x00,
		bot_beg: I64 @ 0x08,
		mem_beg: I64 @ 0x10,
		buf_beg: I64 @ 0x18,
		buf_end: I64 @ 0x20,
		// 0x28 is reserved.
		fsid: Guid @ 0x30,
		fstype: Guid @ 0x40,
		label: Bytes(64) @ 0x50,
		vol_no: I32 @ 0x90,
		vol_count: I32 @ 0x94,
		version: U32 @ 0x98,
		crc: U32 @ 0x9C,
		flags: U32 @ 0xA0,
		rootvol: U32 @ 0xA4,
		stat_bigblocks: I64 @ 0xC8,
		stat_freebigblocks: I64 @ 0xD0,
		stat_inodes: I64 @ 0xE0,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&VOLUME_HEADER];

static LAYOUT: Layout = Layout {
	record: &VOLUME_HEADER,
	locations: &[0],
	optical_offsets: &[],
	signature: Signature::Int {
		field: "signature",
		values: &[HAMMER_MAGIC],
	},
	orders: EITHER,
};

pub struct Hammer;

impl Hammer {
	fn find(&self, volume: &Volume) -> Option<Found> {
		scan(volume, &LAYOUT, |record, _| match (record.i64("vol_no"), record.i64("vol_count")) {
			(Ok(no), Ok(count)) => count > 0 && (0..count).contains(&no),
			_ => false,
		})
	}
}

impl Filesystem for Hammer {
	fn name(&self) -> &'static str {
		"hammer"
	}

	fn description(&self) -> &'static str {
		"HAMMER filesystem"
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

		let vol_no = record.i64("vol_no")?;
		let root = vol_no == record.u64("rootvol")? as i64;

		let mut report = Report::new(self.description());
		report.line(format_args!("Byte order: {}", found.endian.name()));
		report.line(format_args!("Version: {}", record.u64("version")?));
		report.line(format_args!("Volume {} of {}", vol_no + 1, record.i64("vol_count")?));

		let mut info = VolumeInfo::new(self.description(), BIGBLOCK_SIZE, volume.size_in_bytes() / BIGBLOCK_SIZE as u64);
		if root {
			// Only the root volume carries statistics for the whole filesystem.
			let total = record.i64("stat_bigblocks")?.max(0) as u64;
			let free = record.i64("stat_freebigblocks")?.max(0) as u64;
			if free > total {
				report.corrupt(format_args!("{} free of {} big-blocks", free, total));
			}

			info.clusters = total;
			info.free_clusters = Some(free.min(total));
			info.files = Some(record.i64("stat_inodes")?.max(0) as u64);
		}
		info.volume_name = optional_text(record.bytes("label")?, StringKind::NulTerminated, encoding.unwrap_or(Encoding::Utf8));
		info.volume_serial = Some(record.uuid("fsid")?.to_string());

		Ok(finish(report, info))
	}
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	builder(bytestruct::Endian::Little).build()
}

#[cfg(test)]
fn builder(endian: bytestruct::Endian) -> crate::testing::ImageBuilder {
	let mut image = crate::testing::ImageBuilder::new(4, 512);
	image
		.endian(endian)
		.field(0, &VOLUME_HEADER, "signature", HAMMER_MAGIC)
		.field(0, &VOLUME_HEADER, "vol_no", 0)
		.field(0, &VOLUME_HEADER, "vol_count", 1)
		.field(0, &VOLUME_HEADER, "rootvol", 0)
		.field(0, &VOLUME_HEADER, "version", 7)
		.field(0, &VOLUME_HEADER, "stat_bigblocks", 1000)
		.field(0, &VOLUME_HEADER, "stat_freebigblocks", 900)
		.field(0, &VOLUME_HEADER, "stat_inodes", 42)
		.text(0, &VOLUME_HEADER, "label", b"ROOT")
		.bytes(0x30, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10]);
	image
}
