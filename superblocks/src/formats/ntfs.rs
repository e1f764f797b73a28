use bytestruct::{record, RecordDescriptor};

use super::finish;
use crate::{
	error::ProbeError,
	normalize::{Encoding, Report, VolumeInfo},
	resolve::{Signature, LITTLE},
	scan::{scan, Found, Layout},
	types::{Filesystem, Information, Volume},
};

const BOOT_SIGNATURE: u64 = 0xAA55;

record! {
	pub static BOOT_SECTOR: "NTFS boot sector", size = 0x200; {
		oem_name: Bytes(8) @ 0x03,
		bytes_per_sector: U16 @ 0x0B,
		sectors_per_cluster: U8 @ 0x0D,
		reserved_sectors: U16 @ 0x0E,
		fats: U8 @ 0x10,
		root_entries: U16 @ 0x11,
		sectors16: U16 @ 0x13,
		media: U8 @ 0x15,
		sectors_per_fat: U16 @ 0x16,
		hidden_sectors: U32 @ 0x1C,
		total_sectors: U64 @ 0x28,
		mft_lcn: U64 @ 0x30,
		mftmirr_lcn: U64 @ 0x38,
		clusters_per_mft_record: U8 @ 0x40,
		clusters_per_index_record: U8 @ 0x44,
		serial: U64 @ 0x48,
		boot_signature: U16 @ 0x1FE,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&BOOT_SECTOR];

static LAYOUT: Layout = Layout {
	record: &BOOT_SECTOR,
	locations: &[0],
	optical_offsets: &[],
	signature: Signature::Bytes {
		field: "oem_name",
		values: &[b"NTFS    "],
	},
	orders: LITTLE,
};

/// Returns the size in bytes of an MFT or index record. Values that don't fit in a cluster are
/// stored as a negative power of two.
fn record_size(raw: u64, cluster_size: u64) -> u64 {
	match raw as u8 as i8 {
		shift @ i8::MIN..=-1 => 1u64.checked_shl(shift.unsigned_abs() as u32).unwrap_or(0),
		clusters => clusters as u64 * cluster_size,
	}
}

pub struct Ntfs;

impl Ntfs {
	fn find(&self, volume: &Volume) -> Option<Found> {
		scan(volume, &LAYOUT, |record, _| {
			let zero = |name| matches!(record.u64(name), Ok(0));
			zero("fats")
				&& zero("sectors_per_fat")
				&& zero("root_entries")
				&& zero("sectors16")
				&& matches!(record.u64("boot_signature"), Ok(BOOT_SIGNATURE))
				&& matches!(record.u64("bytes_per_sector"), Ok(bps) if bps >= 256 && bps.is_power_of_two())
				&& matches!(record.u64("sectors_per_cluster"), Ok(spc) if spc > 0)
		})
	}
}

impl Filesystem for Ntfs {
	fn name(&self) -> &'static str {
		"ntfs"
	}

	fn description(&self) -> &'static str {
		"NTFS"
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

		let bytes_per_sector = record.u64("bytes_per_sector")?;
		let sectors_per_cluster = record.u64("sectors_per_cluster")?;
		let cluster_size = bytes_per_sector * sectors_per_cluster;

		let mut report = Report::new(self.description());
		report.line(format_args!("MFT at cluster {}", record.u64("mft_lcn")?));
		report.line(format_args!("MFT mirror at cluster {}", record.u64("mftmirr_lcn")?));
		report.line(format_args!(
			"MFT record size: {} bytes",
			record_size(record.u64("clusters_per_mft_record")?, cluster_size)
		));
		report.line(format_args!(
			"Index record size: {} bytes",
			record_size(record.u64("clusters_per_index_record")?, cluster_size)
		));

		let mut info = VolumeInfo::new(self.description(), cluster_size as u32, record.u64("total_sectors")? / sectors_per_cluster);
		info.volume_serial = Some(format!("{:016X}", record.u64("serial")?));

		Ok(finish(report, info))
	}
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	builder().build()
}

#[cfg(test)]
fn builder() -> crate::testing::ImageBuilder {
	let mut image = crate::testing::ImageBuilder::new(2, 512);
	image
		.text(0, &BOOT_SECTOR, "oem_name", b"NTFS    ")
		.field(0, &BOOT_SECTOR, "bytes_per_sector", 512)
		.field(0, &BOOT_SECTOR, "sectors_per_cluster", 8)
		.field(0, &BOOT_SECTOR, "media", 0xF8)
		.field(0, &BOOT_SECTOR, "total_sectors", 2_097_151)
		.field(0, &BOOT_SECTOR, "mft_lcn", 4)
		.field(0, &BOOT_SECTOR, "mftmirr_lcn", 131071)
		.field(0, &BOOT_SECTOR, "clusters_per_mft_record", 0xF6)
		.field(0, &BOOT_SECTOR, "clusters_per_index_record", 1)
		.field(0, &BOOT_SECTOR, "serial", 0x0123456789ABCDEF)
		.field(0, &BOOT_SECTOR, "boot_signature", BOOT_SIGNATURE);
	image
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_identify() {
		let image = sample();
		let volume = Volume::whole(&image);
		assert!(Ntfs.identify(&volume));

		let info = Ntfs.information(&volume, None).unwrap();
		assert_eq!(info.metadata.cluster_size, 4096);
		assert_eq!(info.metadata.clusters, 262143);
		assert_eq!(info.metadata.volume_serial.as_deref(), Some("0123456789ABCDEF"));
		assert_eq!(info.metadata.volume_name, None);
		assert!(info.text.contains("MFT record size: 1024 bytes"));
		assert!(info.text.contains("Index record size: 4096 bytes"));
	}

	#[test]
	fn test_fat_fields_must_be_zero() {
		let mut image = builder();
		image.field(0, &BOOT_SECTOR, "fats", 2);
		assert!(!Ntfs.identify(&Volume::whole(&image.build())));
	}

	#[test]
	fn test_boot_signature_required() {
		let mut image = builder();
		image.field(0, &BOOT_SECTOR, "boot_signature", 0);
		assert!(!Ntfs.identify(&Volume::whole(&image.build())));
	}

	#[test]
	fn test_zeroed_magic() {
		let mut image = builder();
		image.text(0, &BOOT_SECTOR, "oem_name", b"");
		assert!(!Ntfs.identify(&Volume::whole(&image.build())));
	}
}
