use bytestruct::{int_enum, record, RecordDescriptor};

use super::{check_count, finish};
use crate::{
	error::ProbeError,
	normalize::{free_clusters, optional_text, Encoding, Report, StringKind, VolumeInfo},
	resolve::{Signature, LITTLE},
	scan::{scan, Found, Layout},
	types::{Filesystem, Information, Volume},
};

const BTRFS_MAGIC: &[u8] = b"_BHRfS_M";
/// The checksum covers everything after the checksum field itself.
const CHECKSUMMED: std::ops::Range<usize> = 0x20..0x1000;

int_enum! {
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub enum ChecksumKind: u16 {
		Crc32c = 0 => "crc32c",
		XxHash = 1 => "xxhash64",
		Sha256 = 2 => "sha256",
		Blake2 = 3 => "blake2b",
	}
}

record! {
	pub static SUPERBLOCK: "btrfs superblock", size = 0x1000; {
		csum: Bytes(32) @ 0x00,
		fsid: Uuid @ 0x20,
		bytenr: U64 @ 0x30,
		flags: U64 @ 0x38,
		magic: Bytes(8) @ 0x40,
		generation: U64 @ 0x48,
		root: U64 @ 0x50,
		chunk_root: U64 @ 0x58,
		log_root: U64 @ 0x60,
		total_bytes: U64 @ 0x70,
		bytes_used: U64 @ 0x78,
		num_devices: U64 @ 0x88,
		sectorsize: U32 @ 0x90,
		nodesize: U32 @ 0x94,
		stripesize: U32 @ 0x9C,
		compat_flags: U64 @ 0xAC,
		compat_ro_flags: U64 @ 0xB4,
		incompat_flags: U64 @ 0xBC,
		csum_type: U16 @ 0xC4,
		root_level: U8 @ 0xC6,
		devid: U64 @ 0xC9,
		dev_uuid: Uuid @ 0x10B,
		label: Bytes(0x100) @ 0x12B,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&SUPERBLOCK];

static LAYOUT: Layout = Layout {
	record: &SUPERBLOCK,
	locations: &[0x10000],
	optical_offsets: &[],
	signature: Signature::Bytes {
		field: "magic",
		values: &[BTRFS_MAGIC],
	},
	orders: LITTLE,
};

/// Returns the stored and computed checksums when the superblock uses CRC32C.
fn crc32c_sums(buffer: &[u8]) -> Option<(u32, u32)> {
	let stored = u32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
	Some((stored, crc32c::crc32c(buffer.get(CHECKSUMMED)?)))
}

pub struct Btrfs;

impl Btrfs {
	fn find(&self, volume: &Volume) -> Option<Found> {
		scan(volume, &LAYOUT, |record, _| matches!(record.u32("sectorsize"), Ok(size) if size.is_power_of_two()))
	}
}

impl Filesystem for Btrfs {
	fn name(&self) -> &'static str {
		"btrfs"
	}

	fn description(&self) -> &'static str {
		"B-tree file system"
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

		let sectorsize = record.u32("sectorsize")?;
		let total = record.u64("total_bytes")? / sectorsize as u64;
		let used = record.u64("bytes_used")? / sectorsize as u64;

		let mut report = Report::new(self.description());
		report.line(format_args!("Generation: {}", record.u64("generation")?));
		report.line(format_args!("Devices: {}", record.u64("num_devices")?));
		report.line(format_args!("Node size: {} bytes", record.u64("nodesize")?));

		match ChecksumKind::try_from(record.u64("csum_type")? as u16) {
			Ok(ChecksumKind::Crc32c) => match crc32c_sums(&found.buffer) {
				Some((stored, computed)) if stored != computed => {
					report.corrupt(format_args!("checksum {:08X} should be {:08X}", stored, computed));
				}
				_ => {}
			},
			Ok(kind) => {
				report.line(format_args!("Checksum: {}", kind));
			}
			Err(e) => {
				report.warn(e);
			}
		}
		check_count(&mut report, "used sectors", total, used);

		let mut info = VolumeInfo::new(self.description(), sectorsize, total);
		info.free_clusters = Some(free_clusters(total, used));
		info.volume_name = optional_text(record.bytes("label")?, StringKind::NulTerminated, Encoding::Utf8);
		info.volume_serial = Some(record.uuid("fsid")?.to_string());

		Ok(finish(report, info))
	}
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	builder().build()
}

#[cfg(test)]
fn builder() -> crate::testing::ImageBuilder {
	let mut image = crate::testing::ImageBuilder::new(0x11000 / 512, 512);
	image
		.text(0x10000, &SUPERBLOCK, "magic", BTRFS_MAGIC)
		.field(0x10000, &SUPERBLOCK, "bytenr", 0x10000)
		.field(0x10000, &SUPERBLOCK, "generation", 7)
		.field(0x10000, &SUPERBLOCK, "total_bytes", 1 << 30)
		.field(0x10000, &SUPERBLOCK, "bytes_used", 1 << 20)
		.field(0x10000, &SUPERBLOCK, "num_devices", 1)
		.field(0x10000, &SUPERBLOCK, "sectorsize", 4096)
		.field(0x10000, &SUPERBLOCK, "nodesize", 16384)
		.text(0x10000, &SUPERBLOCK, "label", b"pool");
	seal(&mut image);
	image
}

#[cfg(test)]
fn seal(image: &mut crate::testing::ImageBuilder) {
	let start = 0x10000 + CHECKSUMMED.start;
	let sum = crc32c::crc32c(&image.data()[start..0x10000 + CHECKSUMMED.end]);
	image.bytes(0x10000, &sum.to_le_bytes());
}
