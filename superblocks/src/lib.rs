//! Identifies filesystems from their superblocks and describes the volumes they hold.

mod codepage;
mod error;
pub mod formats;
pub mod normalize;
mod registry;
pub mod resolve;
pub mod scan;
pub mod source;
#[cfg(test)]
mod testing;
mod types;

pub use error::ProbeError;
pub use normalize::{Encoding, StringKind, VolumeInfo};
pub use registry::Registry;
pub use resolve::Signature;
pub use scan::{scan, Candidate, Found, Layout, Scanner};
pub use source::{FileImage, MediaKind, MemoryImage, Partition, ReadError, SectorSource};
pub use types::{Filesystem, Information, Volume};
