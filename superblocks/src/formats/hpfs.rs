use bytestruct::{record, Endian, RecordDescriptor};

use super::finish;
use crate::{
	error::ProbeError,
	normalize::{optional_text, unix, Encoding, Report, StringKind, VolumeInfo},
	resolve::{Signature, LITTLE},
	scan::{scan, Found, Layout},
	types::{Filesystem, Information, Volume},
};

pub const HPFS_SUPER_MAGIC: u64 = 0xF995E849;
pub const HPFS_SUPER_MAGIC1: u64 = 0xFA53E9C5;
pub const HPFS_SPARE_MAGIC: u64 = 0xF9911849;
pub const HPFS_SPARE_MAGIC1: u64 = 0xFA5229C5;

const SUPERBLOCK_OFFSET: u64 = 16 * 512;
const SPAREBLOCK_OFFSET: u64 = 17 * 512;
/// HPFS only ever used 512-byte sectors.
const SECTOR_SIZE: u32 = 512;
/// Spare block flag set while the volume is mounted.
const SPARE_DIRTY: u64 = 0x01;

record! {
	pub static BOOT_SECTOR: "HPFS boot sector", size = 0x3E; {
		oem_name: Bytes(8) @ 0x03,
		bytes_per_sector: U16 @ 0x0B,
		sectors_per_cluster: U8 @ 0x0D,
		big_sectors: U32 @ 0x20,
		extended_signature: U8 @ 0x26,
		serial: U32 @ 0x27,
		label: Bytes(11) @ 0x2B,
		fs_type: Bytes(8) @ 0x36,
	}
}

record! {
	pub static SUPERBLOCK: "HPFS superblock", size = 0x34; {
		magic: U32 @ 0x00,
		magic1: U32 @ 0x04,
		version: U8 @ 0x08,
		funcversion: U8 @ 0x09,
		root_fnode: U32 @ 0x0C,
		sectors: U32 @ 0x10,
		badblocks: U32 @ 0x14,
		bitmaps: U32 @ 0x18,
		last_chkdsk: U32 @ 0x28,
		last_optimize: U32 @ 0x2C,
		dir_band_sectors: U32 @ 0x30,
	}
}

record! {
	pub static SPAREBLOCK: "HPFS spare block", size = 0x10; {
		magic: U32 @ 0x00,
		magic1: U32 @ 0x04,
		flags: U8 @ 0x08,
		n_spares_used: U32 @ 0x0C,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&BOOT_SECTOR, &SUPERBLOCK, &SPAREBLOCK];

static LAYOUT: Layout = Layout {
	record: &SUPERBLOCK,
	locations: &[SUPERBLOCK_OFFSET],
	optical_offsets: &[],
	signature: Signature::Int {
		field: "magic",
		values: &[HPFS_SUPER_MAGIC],
	},
	orders: LITTLE,
};

pub struct Hpfs;

impl Hpfs {
	fn find(&self, volume: &Volume) -> Option<Found> {
		scan(volume, &LAYOUT, |record, _| matches!(record.u64("magic1"), Ok(HPFS_SUPER_MAGIC1)))
	}
}

impl Filesystem for Hpfs {
	fn name(&self) -> &'static str {
		"hpfs"
	}

	fn description(&self) -> &'static str {
		"HPFS"
	}

	fn records(&self) -> &'static [&'static RecordDescriptor] {
		RECORDS
	}

	fn identify(&self, volume: &Volume) -> bool {
		self.find(volume).is_some()
	}

	fn information(&self, volume: &Volume, encoding: Option<Encoding>) -> Result<Information, ProbeError> {
		let found = self.find(volume).ok_or(ProbeError::MagicMismatch(self.name()))?;
		let superblock = &found.record;
		let boot = volume.read_record(0, &BOOT_SECTOR, Endian::Little)?;
		let spare = volume.read_record(SPAREBLOCK_OFFSET, &SPAREBLOCK, Endian::Little)?;

		let mut report = Report::new(self.description());
		report.line(format_args!("Version: {}.{}", superblock.u64("version")?, superblock.u64("funcversion")?));
		report.line(format_args!("Bad blocks: {}", superblock.u64("badblocks")?));
		if let Some(checked) = unix(superblock.u64("last_chkdsk")? as i64) {
			report.line(format_args!("Last checked: {}", checked));
		}
		if let Some(optimized) = unix(superblock.u64("last_optimize")? as i64) {
			report.line(format_args!("Last optimized: {}", optimized));
		}

		let spare_valid = spare.u64("magic")? == HPFS_SPARE_MAGIC && spare.u64("magic1")? == HPFS_SPARE_MAGIC1;
		if !spare_valid {
			report.corrupt("spare block signature is wrong");
		}

		let cluster_size = match boot.u32("bytes_per_sector")? {
			size if size >= SECTOR_SIZE && size.is_power_of_two() => size,
			size => {
				report.corrupt(format_args!("boot sector claims {} bytes per sector", size));
				SECTOR_SIZE
			}
		};

		let mut info = VolumeInfo::new(self.description(), cluster_size, superblock.u64("sectors")?);
		info.volume_name = optional_text(boot.bytes("label")?, StringKind::SpacePadded, encoding.unwrap_or(Encoding::Latin1));
		let serial = boot.u32("serial")?;
		info.volume_serial = Some(format!("{:04X}-{:04X}", serial >> 16, serial & 0xFFFF));
		info.dirty = spare_valid && spare.u64("flags")? & SPARE_DIRTY != 0;

		Ok(finish(report, info))
	}
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	builder().build()
}

#[cfg(test)]
fn builder() -> crate::testing::ImageBuilder {
	let mut image = crate::testing::ImageBuilder::new(32, 512);
	image
		.text(0, &BOOT_SECTOR, "oem_name", b"IBM 10.2")
		.field(0, &BOOT_SECTOR, "bytes_per_sector", 512)
		.field(0, &BOOT_SECTOR, "extended_signature", 0x29)
		.field(0, &BOOT_SECTOR, "serial", 0x1234ABCD)
		.text(0, &BOOT_SECTOR, "label", b"OS2        ")
		.text(0, &BOOT_SECTOR, "fs_type", b"HPFS    ")
		.field(SUPERBLOCK_OFFSET, &SUPERBLOCK, "magic", HPFS_SUPER_MAGIC)
		.field(SUPERBLOCK_OFFSET, &SUPERBLOCK, "magic1", HPFS_SUPER_MAGIC1)
		.field(SUPERBLOCK_OFFSET, &SUPERBLOCK, "version", 2)
		.field(SUPERBLOCK_OFFSET, &SUPERBLOCK, "funcversion", 2)
		.field(SUPERBLOCK_OFFSET, &SUPERBLOCK, "sectors", 40960)
		.field(SPAREBLOCK_OFFSET, &SPAREBLOCK, "magic", HPFS_SPARE_MAGIC)
		.field(SPAREBLOCK_OFFSET, &SPAREBLOCK, "magic1", HPFS_SPARE_MAGIC1);
	image
}
