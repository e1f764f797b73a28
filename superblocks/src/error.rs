use bytestruct::DecodeError;
use thiserror::Error;

use crate::source::ReadError;

#[derive(Error, Debug)]
pub enum ProbeError {
	#[error("failed to read from the source: {0}")]
	Read(#[from] ReadError),

	#[error("failed to decode structure: {0}")]
	Decode(#[from] DecodeError),

	#[error("no {0} signature found")]
	MagicMismatch(&'static str),

	#[error("{count} sectors at partition sector {sector} extend past the end of the partition")]
	OutOfRange { sector: u64, count: u64 },

	#[error("superblock seems corrupt: {0}")]
	StructuralInvariantViolation(String),

	#[error("unknown filesystem format {0:?}")]
	UnknownFormat(String),
}

impl ProbeError {
	/// Returns true for errors that only mean "this isn't the format we were looking for".
	pub fn is_mismatch(&self) -> bool {
		matches!(
			self,
			ProbeError::MagicMismatch(_) | ProbeError::OutOfRange { .. } | ProbeError::Decode(DecodeError::TooShort { .. })
		)
	}
}
