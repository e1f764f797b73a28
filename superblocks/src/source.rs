use std::{
	fs::File,
	io,
	os::unix::fs::FileExt,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kind of media an image came from. Optical media use large sectors, so structures laid out
/// for 512 byte sectors can end up in the middle of a physical sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
	Disk,
	Optical,
}

impl MediaKind {
	pub fn from_sector_size(sector_size: u32) -> Self {
		match sector_size {
			2048 | 2336 | 2352 => MediaKind::Optical,
			_ => MediaKind::Disk,
		}
	}
}

/// A run of sectors on a source. `end` is the last valid sector, not one past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
	pub start: u64,
	pub end: u64,
}

impl Partition {
	pub fn new(start: u64, end: u64) -> Self {
		Self { start, end }
	}

	/// A partition spanning every sector of the source.
	pub fn whole(source: &dyn SectorSource) -> Self {
		Self {
			start: 0,
			end: source.sector_count().saturating_sub(1),
		}
	}

	pub fn length(&self) -> u64 {
		(self.end + 1).saturating_sub(self.start)
	}

	/// Returns true if `count` sectors starting `sector` sectors into the partition lie inside it.
	pub fn contains(&self, sector: u64, count: u64) -> bool {
		match self.start.checked_add(sector).and_then(|s| s.checked_add(count)) {
			Some(past_end) => count > 0 && past_end - 1 <= self.end,
			None => false,
		}
	}
}

#[derive(Error, Debug)]
pub enum ReadError {
	#[error("I/O error reading sectors: {0}")]
	Io(#[from] io::Error),

	#[error("cannot read {count} sectors at {lba}: the source has {sectors} sectors")]
	OutOfBounds { lba: u64, count: u64, sectors: u64 },
}

/// Something that hands out fixed size sectors by logical block address.
pub trait SectorSource {
	fn sector_size(&self) -> u32;

	fn sector_count(&self) -> u64;

	fn media_kind(&self) -> MediaKind {
		MediaKind::from_sector_size(self.sector_size())
	}

	fn read_sectors(&self, lba: u64, count: u64) -> Result<Vec<u8>, ReadError>;

	fn read_sector(&self, lba: u64) -> Result<Vec<u8>, ReadError> {
		self.read_sectors(lba, 1)
	}
}

fn check_bounds(lba: u64, count: u64, sectors: u64) -> Result<(), ReadError> {
	match lba.checked_add(count) {
		Some(end) if end <= sectors => Ok(()),
		_ => Err(ReadError::OutOfBounds { lba, count, sectors }),
	}
}

/// A raw disk image on the filesystem.
pub struct FileImage {
	path: PathBuf,
	file: File,
	sector_size: u32,
	sectors: u64,
	media: MediaKind,
}

impl FileImage {
	/// Opens the image at `path`, splitting it into `sector_size` byte sectors. A trailing partial
	/// sector is ignored.
	pub fn open<P: AsRef<Path>>(path: P, sector_size: u32) -> io::Result<Self> {
		if sector_size == 0 {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "sector size must not be zero"));
		}

		let file = File::open(path.as_ref())?;
		let sectors = file.metadata()?.len() / sector_size as u64;

		Ok(Self {
			path: path.as_ref().to_path_buf(),
			file,
			sector_size,
			sectors,
			media: MediaKind::from_sector_size(sector_size),
		})
	}

	/// Overrides the media kind guessed from the sector size.
	pub fn with_media(mut self, media: MediaKind) -> Self {
		self.media = media;
		self
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl SectorSource for FileImage {
	fn sector_size(&self) -> u32 {
		self.sector_size
	}

	fn sector_count(&self) -> u64 {
		self.sectors
	}

	fn media_kind(&self) -> MediaKind {
		self.media
	}

	fn read_sectors(&self, lba: u64, count: u64) -> Result<Vec<u8>, ReadError> {
		check_bounds(lba, count, self.sectors)?;

		let mut buffer = vec![0; (count * self.sector_size as u64) as usize];
		self.file.read_exact_at(&mut buffer, lba * self.sector_size as u64)?;

		Ok(buffer)
	}
}

/// An image held in memory.
#[derive(Debug, Clone)]
pub struct MemoryImage {
	data: Vec<u8>,
	sector_size: u32,
	media: MediaKind,
}

impl MemoryImage {
	pub fn new(data: Vec<u8>, sector_size: u32) -> Self {
		Self {
			data,
			sector_size: sector_size.max(1),
			media: MediaKind::from_sector_size(sector_size),
		}
	}

	pub fn with_media(mut self, media: MediaKind) -> Self {
		self.media = media;
		self
	}

	pub fn data(&self) -> &[u8] {
		&self.data
	}
}

impl SectorSource for MemoryImage {
	fn sector_size(&self) -> u32 {
		self.sector_size
	}

	fn sector_count(&self) -> u64 {
		self.data.len() as u64 / self.sector_size as u64
	}

	fn media_kind(&self) -> MediaKind {
		self.media
	}

	fn read_sectors(&self, lba: u64, count: u64) -> Result<Vec<u8>, ReadError> {
		check_bounds(lba, count, self.sector_count())?;

		let start = (lba * self.sector_size as u64) as usize;
		let end = start + (count * self.sector_size as u64) as usize;
		Ok(self.data[start..end].to_vec())
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn test_partition_bounds_are_inclusive() {
		let partition = Partition::new(10, 19);
		assert_eq!(partition.length(), 10);
		assert!(partition.contains(0, 10));
		assert!(partition.contains(9, 1));
		assert!(!partition.contains(9, 2));
		assert!(!partition.contains(10, 1));
		assert!(!partition.contains(0, 0));
		assert!(!partition.contains(u64::MAX, 1));
	}

	#[test]
	fn test_memory_image_reads() {
		let data: Vec<u8> = (0..4).flat_map(|i| vec![i as u8; 512]).collect();
		let image = MemoryImage::new(data, 512);
		assert_eq!(image.sector_count(), 4);
		assert_eq!(image.media_kind(), MediaKind::Disk);

		let sectors = image.read_sectors(1, 2).unwrap();
		assert_eq!(sectors.len(), 1024);
		assert_eq!(sectors[0], 1);
		assert_eq!(sectors[1023], 2);

		assert!(matches!(image.read_sectors(3, 2), Err(ReadError::OutOfBounds { .. })));
	}

	#[test]
	fn test_optical_media_guess() {
		let image = MemoryImage::new(vec![0; 4096], 2048);
		assert_eq!(image.media_kind(), MediaKind::Optical);
		assert_eq!(image.with_media(MediaKind::Disk).media_kind(), MediaKind::Disk);
	}

	#[test]
	fn test_file_image_reads() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		let data: Vec<u8> = (0..3).flat_map(|i| vec![i as u8 + 1; 512]).collect();
		file.write_all(&data).unwrap();
		file.write_all(&[0xAA; 100]).unwrap();
		file.flush().unwrap();

		let image = FileImage::open(file.path(), 512).unwrap();
		assert_eq!(image.sector_count(), 3);
		assert_eq!(image.read_sector(2).unwrap(), vec![3; 512]);
		assert!(image.read_sector(3).is_err());
		assert!(FileImage::open(file.path(), 0).is_err());
	}
}
