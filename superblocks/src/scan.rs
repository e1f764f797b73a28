use bytestruct::{DecodedRecord, Endian, RecordDescriptor};
use slog::{debug, trace};

use crate::{
	error::ProbeError,
	resolve::{resolve, Signature},
	source::{MediaKind, Partition},
	types::Volume,
};

/// A place a record might live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
	/// Offset of the record from the start of the partition.
	pub byte_offset: u64,
	/// First sector to read, relative to the start of the partition.
	pub sector: u64,
	/// How many sectors cover the record.
	pub count: u64,
	/// Offset of the record inside the sectors that were read.
	pub offset: usize,
}

impl Candidate {
	pub fn locate(byte_offset: u64, sector_size: u32, size: usize) -> Self {
		let sector_size = sector_size.max(1) as u64;
		let offset = byte_offset % sector_size;

		Self {
			byte_offset,
			sector: byte_offset / sector_size,
			count: (offset + size as u64).div_ceil(sector_size),
			offset: offset as usize,
		}
	}

	/// The absolute address of the first sector.
	pub fn lba(&self, partition: &Partition) -> u64 {
		partition.start + self.sector
	}
}

/// Where and how a format's primary record is found.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
	pub record: &'static RecordDescriptor,
	/// Byte offsets from the start of the partition, in the order they are tried.
	pub locations: &'static [u64],
	/// Extra offsets tried after every location on optical media, where the record may sit
	/// partway into a large sector.
	pub optical_offsets: &'static [u64],
	pub signature: Signature,
	pub orders: &'static [Endian],
}

/// Lazily walks the candidate locations of a record.
///
/// The first candidate that doesn't fit inside the partition yields [`ProbeError::OutOfRange`]
/// and ends the walk.
pub struct Scanner {
	partition: Partition,
	sector_size: u32,
	size: usize,
	offsets: Vec<u64>,
	next: usize,
	done: bool,
}

impl Scanner {
	pub fn new(partition: Partition, sector_size: u32, media: MediaKind, locations: &[u64], optical_offsets: &[u64], size: usize) -> Self {
		let offsets = match media {
			MediaKind::Optical if !optical_offsets.is_empty() => locations
				.iter()
				.flat_map(|location| optical_offsets.iter().map(move |sub| location + sub))
				.collect(),
			_ => locations.to_vec(),
		};

		Self {
			partition,
			sector_size,
			size,
			offsets,
			next: 0,
			done: false,
		}
	}
}

impl Iterator for Scanner {
	type Item = Result<Candidate, ProbeError>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.done || self.next >= self.offsets.len() {
			return None;
		}

		let candidate = Candidate::locate(self.offsets[self.next], self.sector_size, self.size);
		self.next += 1;

		if !self.partition.contains(candidate.sector, candidate.count) {
			self.done = true;
			return Some(Err(ProbeError::OutOfRange {
				sector: candidate.sector,
				count: candidate.count,
			}));
		}

		Some(Ok(candidate))
	}
}

/// A record that passed every check.
#[derive(Debug, Clone)]
pub struct Found {
	pub record: DecodedRecord,
	pub endian: Endian,
	pub candidate: Candidate,
	/// The raw bytes of the record, starting at its first byte.
	pub buffer: Vec<u8>,
}

/// Finds the first candidate of `layout` whose signature resolves and which `validate` accepts.
pub fn scan<F>(volume: &Volume, layout: &Layout, validate: F) -> Option<Found>
where
	F: Fn(&DecodedRecord, &[u8]) -> bool,
{
	scan_at(volume, layout, layout.locations, validate)
}

/// Like [`scan`], but with locations worked out at run time.
pub fn scan_at<F>(volume: &Volume, layout: &Layout, locations: &[u64], validate: F) -> Option<Found>
where
	F: Fn(&DecodedRecord, &[u8]) -> bool,
{
	let logger = volume.logger();
	let partition = volume.partition();
	let descriptor = layout.record;
	let scanner = Scanner::new(
		partition,
		volume.sector_size(),
		volume.media_kind(),
		locations,
		layout.optical_offsets,
		descriptor.size,
	);

	for candidate in scanner {
		let candidate = match candidate {
			Ok(candidate) => candidate,
			Err(e) => {
				debug!(logger, "giving up on record"; "record" => descriptor.name, "reason" => e.to_string());
				return None;
			}
		};

		trace!(logger, "probing candidate"; "record" => descriptor.name, "byte_offset" => candidate.byte_offset, "lba" => candidate.lba(&partition));

		let mut buffer = match volume.source().read_sectors(candidate.lba(&partition), candidate.count) {
			Ok(buffer) => buffer,
			Err(e) => {
				debug!(logger, "failed to read candidate"; "record" => descriptor.name, "byte_offset" => candidate.byte_offset, "error" => e.to_string());
				continue;
			}
		};
		buffer.drain(..candidate.offset);
		buffer.truncate(descriptor.size);

		let endian = match resolve(&buffer, descriptor, &layout.signature, layout.orders) {
			Some(endian) => endian,
			None => {
				trace!(logger, "no signature at candidate"; "record" => descriptor.name, "field" => layout.signature.field());
				continue;
			}
		};

		let record = match descriptor.decode(&buffer, endian) {
			Ok(record) => record,
			Err(e) => {
				debug!(logger, "failed to decode candidate"; "record" => descriptor.name, "error" => e.to_string());
				continue;
			}
		};

		if !validate(&record, &buffer) {
			debug!(logger, "candidate failed validation"; "record" => descriptor.name, "byte_offset" => candidate.byte_offset, "endian" => endian.name());
			continue;
		}

		debug!(logger, "accepted record"; "record" => descriptor.name, "byte_offset" => candidate.byte_offset, "endian" => endian.name());
		return Some(Found {
			record,
			endian,
			candidate,
			buffer,
		});
	}

	None
}

/// Accepts any record whose signature resolved.
pub fn any(_: &DecodedRecord, _: &[u8]) -> bool {
	true
}
