use bytestruct::{record, RecordDescriptor};

use super::finish;
use crate::{
	error::ProbeError,
	normalize::{optional_text, vms, Encoding, Report, StringKind, VolumeInfo},
	resolve::{Signature, LITTLE},
	scan::{scan, Found, Layout},
	types::{Filesystem, Information, Volume},
};

const HOME_BLOCK_OFFSET: u64 = 0x200;
const BLOCK_SIZE: u64 = 512;
const CHECKSUM1_OFFSET: usize = 0x3A;
const CHECKSUM2_OFFSET: usize = 0x1FE;

record! {
	pub static HOME_BLOCK: "Files-11 home block", size = 0x200; {
		homelbn: U32 @ 0x000,
		alhomelbn: U32 @ 0x004,
		altidxlbn: U32 @ 0x008,
		struclev: U16 @ 0x00C,
		cluster: U16 @ 0x00E,
		homevbn: U16 @ 0x010,
		alhomevbn: U16 @ 0x012,
		altidxvbn: U16 @ 0x014,
		ibmapvbn: U16 @ 0x016,
		ibmaplbn: U32 @ 0x018,
		maxfiles: U32 @ 0x01C,
		ibmapsize: U16 @ 0x020,
		resfiles: U16 @ 0x022,
		devtype: U16 @ 0x024,
		rvn: U16 @ 0x026,
		setcount: U16 @ 0x028,
		volchar: U16 @ 0x02A,
		volowner: U32 @ 0x02C,
		protect: U16 @ 0x034,
		fileprot: U16 @ 0x036,
		checksum1: U16 @ 0x03A,
		credate: U64 @ 0x03C,
		window: U8 @ 0x044,
		lru_lim: U8 @ 0x045,
		extend: U16 @ 0x046,
		retainmin: U64 @ 0x048,
		retainmax: U64 @ 0x050,
		revdate: U64 @ 0x058,
		serialnum: U32 @ 0x1C8,
		strucname: Bytes(12) @ 0x1CC,
		volname: Bytes(12) @ 0x1D8,
		ownername: Bytes(12) @ 0x1E4,
		format: Bytes(12) @ 0x1F0,
		checksum2: U16 @ 0x1FE,
	}
}

static RECORDS: &[&RecordDescriptor] = &[&HOME_BLOCK];

static LAYOUT: Layout = Layout {
	record: &HOME_BLOCK,
	locations: &[HOME_BLOCK_OFFSET],
	optical_offsets: &[],
	signature: Signature::Bytes {
		field: "format",
		values: &[b"DECFILE11A  ", b"DECFILE11B  "],
	},
	orders: LITTLE,
};

/// Adds up the little endian words in front of a checksum.
fn checksum(block: &[u8], end: usize) -> u16 {
	block[..end]
		.chunks_exact(2)
		.fold(0u16, |sum, word| sum.wrapping_add(u16::from_le_bytes([word[0], word[1]])))
}

pub struct Ods;

impl Ods {
	fn find(&self, volume: &Volume) -> Option<Found> {
		scan(volume, &LAYOUT, |record, _| {
			matches!(record.u64("cluster"), Ok(cluster) if cluster > 0)
				&& matches!(record.u64("struclev"), Ok(level) if matches!(level >> 8, 2 | 5))
		})
	}
}

impl Filesystem for Ods {
	fn name(&self) -> &'static str {
		"ods"
	}

	fn description(&self) -> &'static str {
		"Files-11 On-Disk Structure"
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

		let struclev = record.u64("struclev")?;
		let kind = format!("{} level {}", self.description(), struclev >> 8);

		let mut report = Report::new(&kind);
		report.line(format_args!("Structure version: {}", struclev & 0xFF));
		if let Some(owner) = optional_text(record.bytes("ownername")?, StringKind::SpacePadded, Encoding::Latin1) {
			report.line(format_args!("Owner: {}", owner));
		}
		if checksum(&found.buffer, CHECKSUM1_OFFSET) != record.u64("checksum1")? as u16 {
			report.corrupt("first home block checksum does not match");
		}
		if checksum(&found.buffer, CHECKSUM2_OFFSET) != record.u64("checksum2")? as u16 {
			report.corrupt("second home block checksum does not match");
		}

		let cluster_size = record.u64("cluster")? * BLOCK_SIZE;
		let mut info = VolumeInfo::new(kind, cluster_size as u32, volume.size_in_bytes() / cluster_size);
		info.files = Some(record.u64("maxfiles")?);
		info.volume_name = optional_text(record.bytes("volname")?, StringKind::SpacePadded, Encoding::Latin1);
		info.volume_serial = Some(format!("{:08X}", record.u64("serialnum")?));
		info.creation_date = vms(record.u64("credate")?);
		info.modification_date = vms(record.u64("revdate")?);

		Ok(finish(report, info))
	}
}

#[cfg(test)]
fn seal(image: &mut crate::testing::ImageBuilder) {
	let block = HOME_BLOCK_OFFSET as usize;
	let first = checksum(&image.data()[block..], CHECKSUM1_OFFSET);
	image.field(HOME_BLOCK_OFFSET, &HOME_BLOCK, "checksum1", first as u64);
	let second = checksum(&image.data()[block..], CHECKSUM2_OFFSET);
	image.field(HOME_BLOCK_OFFSET, &HOME_BLOCK, "checksum2", second as u64);
}

#[cfg(test)]
fn builder() -> crate::testing::ImageBuilder {
	let mut image = crate::testing::ImageBuilder::new(2048, 512);
	image
		.field(HOME_BLOCK_OFFSET, &HOME_BLOCK, "homelbn", 1)
		.field(HOME_BLOCK_OFFSET, &HOME_BLOCK, "struclev", 0x0201)
		.field(HOME_BLOCK_OFFSET, &HOME_BLOCK, "cluster", 4)
		.field(HOME_BLOCK_OFFSET, &HOME_BLOCK, "maxfiles", 1000)
		.field(HOME_BLOCK_OFFSET, &HOME_BLOCK, "serialnum", 0xCAFE)
		.text(HOME_BLOCK_OFFSET, &HOME_BLOCK, "strucname", b"            ")
		.text(HOME_BLOCK_OFFSET, &HOME_BLOCK, "volname", b"VAXSYS      ")
		.text(HOME_BLOCK_OFFSET, &HOME_BLOCK, "ownername", b"SYSTEM      ")
		.text(HOME_BLOCK_OFFSET, &HOME_BLOCK, "format", b"DECFILE11B  ");
	seal(&mut image);
	image
}

#[cfg(test)]
pub(crate) fn sample() -> crate::source::MemoryImage {
	builder().build()
}
