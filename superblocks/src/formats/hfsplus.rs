use bitflags::bitflags;
use bytestruct::{record, DecodedRecord, RecordDescriptor};

use super::{check_count, finish};
use crate::{
	error::ProbeError,
	normalize::{mac, optional_text, Encoding, Report, StringKind, VolumeInfo},
	resolve::{Signature, BIG},
	scan::{scan, scan_at, Found, Layout},
	types::{Filesystem, Information, Volume},
};

/// "H+"
pub const HFSPLUS_SIGNATURE: u64 = 0x482B;
/// "HX", case sensitive HFS+.
pub const HFSX_SIGNATURE: u64 = 0x4858;
/// "BD", a classic HFS master directory block.
pub const HFS_SIGNATURE: u64 = 0x4244;

const HEADER_OFFSET: u64 = 0x400;
const HFS_BLOCK_SIZE: u64 = 512;

bitflags! {
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct Attributes: u32 {
		const HARDWARE_LOCK = 0x0080;
		/// Set on a clean unmount.
		const UNMOUNTED = 0x0100;
		const SPARED_BLOCKS = 0x0200;
		const NO_CACHE = 0x0400;
		/// Needs a consistency check.
		const INCONSISTENT = 0x0800;
		const CNIDS_REUSED = 0x1000;
		const JOURNALED = 0x2000;
		const SOFTWARE_LOCK = 0x8000;
	}
}

record! {
	pub static HEADER: "HFS+ volume header", size = 0x70; {
		signature: U16 @ 0x00,
		version: U16 @ 0x02,
		attributes: U32 @ 0x04,
		last_mounted_version: U32 @ 0x08,
		journal_info_block: U32 @ 0x0C,
		create_date: U32 @ 0x10,
		modify_date: U32 @ 0x14,
		backup_date: U32 @ 0x18,
		checked_date: U32 @ 0x1C,
		file_count: U32 @ 0x20,
		folder_count: U32 @ 0x24,
		block_size: U32 @ 0x28,
		total_blocks: U32 @ 0x2C,
		free_blocks: U32 @ 0x30,
		next_allocation: U32 @ 0x34,
		next_catalog_id: U32 @ 0x40,
		write_count: U32 @ 0x44,
		encodings_bitmap: U64 @ 0x48,
		finder_id_high: U32 @ 0x68,
		finder_id_low: U32 @ 0x6C,
	}
}

record! {
	pub static MASTER_DIRECTORY_BLOCK: "HFS master directory block", size = 0x82; {
		signature: U16 @ 0x00,
		create_date: U32 @ 0x02,
		modify_date: U32 @ 0x06,
		attributes: U16 @ 0x0A,
		files: U16 @ 0x0C,
		bitmap_start: U16 @ 0x0E,
		allocation_blocks: U16 @ 0x12,
		allocation_block_size: U32 @ 0x14,
		clump_size: U32 @ 0x18,
		first_allocation_block: U16 @ 0x1C,
		free_blocks: U16 @ 0x22,
		name: Bytes(28) @ 0x24,
		embed_signature: U16 @ 0x7C,
		embed_start_block: U16 @ 0x7E,
		embed_block_count: U16 @ 0x80,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&HEADER, &MASTER_DIRECTORY_BLOCK];

static LAYOUT: Layout = Layout {
	record: &HEADER,
	locations: &[HEADER_OFFSET],
	optical_offsets: &[],
	signature: Signature::Int {
		field: "signature",
		values: &[HFSPLUS_SIGNATURE, HFSX_SIGNATURE],
	},
	orders: BIG,
};

static WRAPPER_LAYOUT: Layout = Layout {
	record: &MASTER_DIRECTORY_BLOCK,
	locations: &[HEADER_OFFSET],
	optical_offsets: &[],
	signature: Signature::Int {
		field: "signature",
		values: &[HFS_SIGNATURE],
	},
	orders: BIG,
};

fn valid_header(record: &DecodedRecord, _: &[u8]) -> bool {
	let version = match record.u64("signature") {
		Ok(HFSPLUS_SIGNATURE) => 4,
		Ok(_) => 5,
		Err(_) => return false,
	};
	matches!(record.u64("version"), Ok(v) if v == version)
		&& matches!(record.u32("block_size"), Ok(size) if size >= 512 && size.is_power_of_two())
}

/// Returns the byte offset of an HFS+ header embedded in an HFS wrapper.
fn embedded_offset(wrapper: &DecodedRecord) -> Result<u64, ProbeError> {
	Ok(wrapper.u64("first_allocation_block")? * HFS_BLOCK_SIZE
		+ wrapper.u64("embed_start_block")? * wrapper.u64("allocation_block_size")?
		+ HEADER_OFFSET)
}

struct Header {
	found: Found,
	wrapper: Option<DecodedRecord>,
}

pub struct HfsPlus;

impl HfsPlus {
	fn find(&self, volume: &Volume) -> Option<Header> {
		let wrapper = scan(volume, &WRAPPER_LAYOUT, |record, _| {
			matches!(record.u64("embed_signature"), Ok(HFSPLUS_SIGNATURE))
		});

		match wrapper {
			Some(wrapper) => {
				let offset = embedded_offset(&wrapper.record).ok()?;
				let found = scan_at(volume, &LAYOUT, &[offset], valid_header)?;
				Some(Header {
					found,
					wrapper: Some(wrapper.record),
				})
			}
			None => scan(volume, &LAYOUT, valid_header).map(|found| Header { found, wrapper: None }),
		}
	}
}

impl Filesystem for HfsPlus {
	fn name(&self) -> &'static str {
		"hfsplus"
	}

	fn description(&self) -> &'static str {
		"HFS+"
	}

	fn records(&self) -> &'static [&'static RecordDescriptor] {
		RECORDS
	}

	fn identify(&self, volume: &Volume) -> bool {
		self.find(volume).is_some()
	}

	fn information(&self, volume: &Volume, encoding: Option<Encoding>) -> Result<Information, ProbeError> {
		let Header { found, wrapper } = self.find(volume).ok_or(ProbeError::MagicMismatch(self.name()))?;
		let record = &found.record;

		let kind = match record.u64("signature")? {
			HFSX_SIGNATURE => "HFSX",
			_ => self.description(),
		};
		let attributes = Attributes::from_bits_retain(record.u32("attributes")?);

		let mut report = Report::new(kind);
		if wrapper.is_some() {
			report.line(format_args!("Embedded in an HFS wrapper at byte {}", found.candidate.byte_offset));
		}
		if attributes.contains(Attributes::JOURNALED) {
			report.line("Journaled");
		}
		if attributes.intersects(Attributes::HARDWARE_LOCK | Attributes::SOFTWARE_LOCK) {
			report.line("Volume is locked");
		}
		report.line(format_args!("Folders: {}", record.u64("folder_count")?));

		let total = record.u64("total_blocks")?;
		let free = record.u64("free_blocks")?;
		check_count(&mut report, "free blocks", total, free);

		let mut info = VolumeInfo::new(kind, record.u32("block_size")?, total);
		info.free_clusters = Some(free.min(total));
		info.files = Some(record.u64("file_count")?);
		info.creation_date = mac(record.u32("create_date")?);
		info.modification_date = mac(record.u32("modify_date")?);
		info.backup_date = mac(record.u32("backup_date")?);
		info.dirty = !attributes.contains(Attributes::UNMOUNTED) || attributes.contains(Attributes::INCONSISTENT);

		let serial = (record.u64("finder_id_high")?, record.u64("finder_id_low")?);
		if serial != (0, 0) {
			info.volume_serial = Some(format!("{:08X}{:08X}", serial.0, serial.1));
		}

		// The real name lives in the catalog. A wrapper carries a copy in its master directory block.
		if let Some(wrapper) = wrapper {
			info.volume_name = optional_text(
				wrapper.bytes("name")?,
				StringKind::Pascal,
				encoding.unwrap_or(Encoding::MacRoman),
			);
		}

		Ok(finish(report, info))
	}
}

#[cfg(test)]
fn header(image: &mut crate::testing::ImageBuilder, at: u64) -> &mut crate::testing::ImageBuilder {
	let attributes = Attributes::UNMOUNTED | Attributes::JOURNALED;
	image
		.endian(bytestruct::Endian::Big)
		.field(at, &HEADER, "signature", HFSPLUS_SIGNATURE)
		.field(at, &HEADER, "version", 4)
		.field(at, &HEADER, "attributes", attributes.bits() as u64)
		.field(at, &HEADER, "create_date", 2_082_844_800 + 1_000_000_000)
		.field(at, &HEADER, "file_count", 42)
		.field(at, &HEADER, "folder_count", 7)
		.field(at, &HEADER, "block_size", 4096)
		.field(at, &HEADER, "total_blocks", 2560)
		.field(at, &HEADER, "free_blocks", 2000)
		.field(at, &HEADER, "finder_id_high", 0x1122_3344)
		.field(at, &HEADER, "finder_id_low", 0x5566_7788)
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	let mut image = crate::testing::ImageBuilder::new(4, 512);
	header(&mut image, HEADER_OFFSET);
	image.build()
}
