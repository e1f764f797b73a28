use bytestruct::{DecodedRecord, Endian, RecordDescriptor};
use serde::Serialize;
use slog::{o, Discard, Logger};

use crate::{
	error::ProbeError,
	normalize::{Encoding, VolumeInfo},
	source::{MediaKind, Partition, SectorSource},
};

/// A partition of a sector source that is being probed.
pub struct Volume<'a> {
	source: &'a dyn SectorSource,
	partition: Partition,
	logger: Logger,
}

impl<'a> Volume<'a> {
	pub fn new(source: &'a dyn SectorSource, partition: Partition) -> Self {
		Self {
			source,
			partition,
			logger: Logger::root(Discard, o!()),
		}
	}

	/// A volume covering the whole source.
	pub fn whole(source: &'a dyn SectorSource) -> Self {
		Self::new(source, Partition::whole(source))
	}

	pub fn with_logger(mut self, logger: Logger) -> Self {
		self.logger = logger;
		self
	}

	pub fn source(&self) -> &'a dyn SectorSource {
		self.source
	}

	pub fn partition(&self) -> Partition {
		self.partition
	}

	pub fn logger(&self) -> &Logger {
		&self.logger
	}

	pub fn sector_size(&self) -> u32 {
		self.source.sector_size()
	}

	pub fn media_kind(&self) -> MediaKind {
		self.source.media_kind()
	}

	pub fn size_in_bytes(&self) -> u64 {
		self.partition.length() * self.sector_size() as u64
	}

	/// Reads `len` bytes starting `byte_offset` bytes into the partition, going through whole sectors.
	pub fn read_bytes(&self, byte_offset: u64, len: usize) -> Result<Vec<u8>, ProbeError> {
		let sector_size = self.sector_size() as u64;
		let sector = byte_offset / sector_size;
		let offset = (byte_offset % sector_size) as usize;
		let count = (offset + len).div_ceil(sector_size as usize) as u64;

		if !self.partition.contains(sector, count) {
			return Err(ProbeError::OutOfRange { sector, count });
		}

		let mut buffer = self.source.read_sectors(self.partition.start + sector, count)?;
		buffer.drain(..offset);
		buffer.truncate(len);
		Ok(buffer)
	}

	/// Reads and decodes the record at `byte_offset`.
	pub fn read_record(&self, byte_offset: u64, descriptor: &'static RecordDescriptor, endian: Endian) -> Result<DecodedRecord, ProbeError> {
		let buffer = self.read_bytes(byte_offset, descriptor.size)?;
		Ok(descriptor.decode(&buffer, endian)?)
	}
}

/// What an information call produces: a human readable description and the normalized summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Information {
	pub text: String,
	pub metadata: VolumeInfo,
}

/// A probe for one on-disk format.
pub trait Filesystem: Send + Sync {
	/// A short identifier, e.g. "xfs".
	fn name(&self) -> &'static str;

	/// The type string reported for the format.
	fn description(&self) -> &'static str;

	/// The structures this probe decodes.
	fn records(&self) -> &'static [&'static RecordDescriptor];

	/// Returns true if the volume holds this format.
	fn identify(&self, volume: &Volume) -> bool;

	/// Describes a volume that [`identify`](Filesystem::identify) accepted. `encoding` is a hint
	/// for labels in formats that don't mandate their own.
	fn information(&self, volume: &Volume, encoding: Option<Encoding>) -> Result<Information, ProbeError>;
}
