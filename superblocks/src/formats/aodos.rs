use bytestruct::{record, RecordDescriptor};

use super::{check_count, finish};
use crate::{
	error::ProbeError,
	normalize::{free_clusters, optional_text, Encoding, Report, StringKind, VolumeInfo},
	resolve::{Signature, LITTLE},
	scan::{any, scan, Found, Layout},
	types::{Filesystem, Information, Volume},
};

record! {
	pub static BOOT_SECTOR: "AO-DOS boot sector", size = 0x18; {
		identifier: Bytes(8) @ 0x04,
		label: Bytes(8) @ 0x0C,
		files: U16 @ 0x14,
		used_sectors: U16 @ 0x16,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&BOOT_SECTOR];

static LAYOUT: Layout = Layout {
	record: &BOOT_SECTOR,
	locations: &[0],
	optical_offsets: &[],
	signature: Signature::Bytes {
		field: "identifier",
		values: &[b" AO-DOS "],
	},
	orders: LITTLE,
};

/// The BK-0010/BK-0011 floppy format. It only exists on whole 400K or 800K disks.
pub struct AoDos;

impl AoDos {
	fn find(&self, volume: &Volume) -> Option<Found> {
		let sectors = volume.source().sector_count();
		if volume.sector_size() != 512 || !matches!(sectors, 800 | 1600) || volume.partition().start != 0 {
			return None;
		}

		scan(volume, &LAYOUT, any)
	}
}

impl Filesystem for AoDos {
	fn name(&self) -> &'static str {
		"aodos"
	}

	fn description(&self) -> &'static str {
		"Alexander Osipov DOS file system"
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

		let clusters = volume.source().sector_count();
		let used = record.u64("used_sectors")?;

		let mut report = Report::new(self.description());
		check_count(&mut report, "used sectors", clusters, used);

		let mut info = VolumeInfo::new(self.description(), 512, clusters);
		info.free_clusters = Some(free_clusters(clusters, used));
		info.files = Some(record.u64("files")?);
		info.volume_name = optional_text(record.bytes("label")?, StringKind::SpacePadded, Encoding::Koi8R);

		Ok(finish(report, info))
	}
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	builder(1600).build()
}

#[cfg(test)]
fn builder(sectors: usize) -> crate::testing::ImageBuilder {
	let mut image = crate::testing::ImageBuilder::new(sectors, 512);
	image
		.text(0, &BOOT_SECTOR, "identifier", b" AO-DOS ")
		.text(0, &BOOT_SECTOR, "label", &[0xE4, 0xE9, 0xF3, 0xEB, b' ', b' ', b' ', b' '])
		.field(0, &BOOT_SECTOR, "files", 12)
		.field(0, &BOOT_SECTOR, "used_sectors", 300);
	image
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::source::{MemoryImage, Partition};

	#[test]
	fn test_identify_800k_disk() {
		let image = sample();
		let volume = Volume::whole(&image);
		assert!(AoDos.identify(&volume));

		let info = AoDos.information(&volume, None).unwrap();
		assert!(info.metadata.filesystem_type.contains("Alexander Osipov DOS"));
		assert_eq!(info.metadata.clusters, 1600);
		assert_eq!(info.metadata.cluster_size, 512);
		assert_eq!(info.metadata.free_clusters, Some(1300));
		assert_eq!(info.metadata.files, Some(12));
		assert_eq!(info.metadata.volume_name.as_deref(), Some("ДИСК"));
	}

	#[test]
	fn test_zeroed_identifier() {
		let mut image = builder(1600);
		image.text(0, &BOOT_SECTOR, "identifier", b"");
		assert!(!AoDos.identify(&Volume::whole(&image.build())));
	}

	#[test]
	fn test_disk_geometry_is_required() {
		assert!(AoDos.identify(&Volume::whole(&builder(800).build())));
		assert!(!AoDos.identify(&Volume::whole(&builder(1000).build())));

		let image = builder(1600).build();
		assert!(!AoDos.identify(&Volume::new(&image, Partition::new(1, 1599))));

		let image = MemoryImage::new(builder(1600).data().to_vec(), 1024);
		assert!(!AoDos.identify(&Volume::whole(&image)));
	}

	#[test]
	fn test_overcommitted_disk_warns() {
		let mut image = builder(800);
		image.field(0, &BOOT_SECTOR, "used_sectors", 900);
		let info = AoDos.information(&Volume::whole(&image.build()), None).unwrap();
		assert_eq!(info.metadata.free_clusters, Some(0));
		assert!(info.text.contains("WARNING: superblock seems corrupt"));
	}
}
