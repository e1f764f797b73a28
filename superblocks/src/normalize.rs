use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{codepage, error::ProbeError};

/// Seconds between 1904-01-01 (the classic Mac OS epoch) and the Unix epoch.
const MAC_EPOCH_OFFSET: i64 = 2_082_844_800;
/// Seconds between the Unix epoch and 1978-01-01 (the AmigaDOS epoch).
const AMIGA_EPOCH_OFFSET: i64 = 252_460_800;
/// Seconds between 1858-11-17 (the VMS epoch) and the Unix epoch.
const VMS_EPOCH_OFFSET: i64 = 3_506_716_800;
const AMIGA_TICKS_PER_SECOND: i64 = 50;
const VMS_TICKS_PER_SECOND: u64 = 10_000_000;

/// Text encodings used by volume labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
	Latin1,
	Utf8,
	Utf16Le,
	Koi8R,
	MacRoman,
}

impl Encoding {
	pub fn decode(&self, bytes: &[u8]) -> String {
		match self {
			Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
			Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
			Encoding::Utf16Le => {
				let units = bytes.chunks_exact(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
				char::decode_utf16(units)
					.map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
					.collect()
			}
			Encoding::Koi8R => codepage::decode(bytes, &codepage::KOI8_R),
			Encoding::MacRoman => codepage::decode(bytes, &codepage::MAC_ROMAN),
		}
	}
}

impl FromStr for Encoding {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"latin1" | "latin-1" | "iso-8859-1" => Ok(Encoding::Latin1),
			"utf8" | "utf-8" => Ok(Encoding::Utf8),
			"utf16le" | "utf-16le" | "utf-16-le" => Ok(Encoding::Utf16Le),
			"koi8r" | "koi8-r" => Ok(Encoding::Koi8R),
			"macroman" | "mac-roman" | "macintosh" => Ok(Encoding::MacRoman),
			other => Err(format!("unknown encoding: {}", other)),
		}
	}
}

/// How a fixed-width string field marks the end of its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringKind {
	/// Ends at the first NUL.
	NulTerminated,
	/// Padded on the right with spaces or NULs.
	SpacePadded,
	/// The first byte holds the length of the string that follows.
	Pascal,
}

/// Returns the meaningful part of a fixed-width string field.
pub fn trim(bytes: &[u8], kind: StringKind) -> &[u8] {
	match kind {
		StringKind::NulTerminated => match bytes.iter().position(|&b| b == 0) {
			Some(end) => &bytes[..end],
			None => bytes,
		},
		StringKind::SpacePadded => {
			let end = bytes.iter().rposition(|&b| b != 0 && b != b' ').map_or(0, |i| i + 1);
			&bytes[..end]
		}
		StringKind::Pascal => match bytes.split_first() {
			Some((&len, rest)) => &rest[..(len as usize).min(rest.len())],
			None => bytes,
		},
	}
}

/// Decodes a fixed-width string field.
pub fn text(bytes: &[u8], kind: StringKind, encoding: Encoding) -> String {
	if encoding == Encoding::Utf16Le && kind != StringKind::Pascal {
		// A NUL in UTF-16 is two bytes wide, so look for it a code unit at a time.
		let end = bytes
			.chunks_exact(2)
			.position(|pair| pair == [0, 0])
			.map_or(bytes.len() & !1, |i| i * 2);
		let decoded = encoding.decode(&bytes[..end]);
		return match kind {
			StringKind::SpacePadded => decoded.trim_end_matches(' ').to_string(),
			_ => decoded,
		};
	}

	encoding.decode(trim(bytes, kind))
}

/// Like [`text`], but a blank string is treated as absent.
pub fn optional_text(bytes: &[u8], kind: StringKind, encoding: Encoding) -> Option<String> {
	let text = text(bytes, kind, encoding);
	let trimmed = text.trim_end();
	if trimmed.is_empty() {
		None
	} else {
		Some(trimmed.to_string())
	}
}

/// Seconds since 1970-01-01. Zero means the field was never set.
pub fn unix(secs: i64) -> Option<DateTime<Utc>> {
	unix_nanos(secs, 0)
}

/// Seconds and nanoseconds since 1970-01-01.
pub fn unix_nanos(secs: i64, nanos: u32) -> Option<DateTime<Utc>> {
	if secs == 0 && nanos == 0 {
		return None;
	}

	at(secs, nanos)
}

fn at(secs: i64, nanos: u32) -> Option<DateTime<Utc>> {
	Utc.timestamp_opt(secs, nanos.min(999_999_999)).single()
}

/// Seconds since 1904-01-01.
pub fn mac(secs: u32) -> Option<DateTime<Utc>> {
	if secs == 0 {
		return None;
	}

	at(secs as i64 - MAC_EPOCH_OFFSET, 0)
}

/// AmigaDOS days since 1978-01-01, minutes past midnight and ticks (1/50 s) past the minute.
pub fn amiga(days: u32, minutes: u32, ticks: u32) -> Option<DateTime<Utc>> {
	if days == 0 && minutes == 0 && ticks == 0 {
		return None;
	}

	let ticks = ticks as i64;
	let secs = AMIGA_EPOCH_OFFSET + days as i64 * 86_400 + minutes as i64 * 60 + ticks / AMIGA_TICKS_PER_SECOND;
	let nanos = (ticks % AMIGA_TICKS_PER_SECOND) as u32 * (1_000_000_000 / AMIGA_TICKS_PER_SECOND as u32);
	at(secs, nanos)
}

/// VMS time: 100ns ticks since 1858-11-17.
pub fn vms(ticks: u64) -> Option<DateTime<Utc>> {
	if ticks == 0 {
		return None;
	}

	let secs = (ticks / VMS_TICKS_PER_SECOND) as i64 - VMS_EPOCH_OFFSET;
	let nanos = (ticks % VMS_TICKS_PER_SECOND) as u32 * 100;
	at(secs, nanos)
}

/// Free clusters computed as `total - used`. A volume claiming to use more than it holds reports
/// zero rather than wrapping.
pub fn free_clusters(total: u64, used: u64) -> u64 {
	total.saturating_sub(used)
}

/// The normalized summary of a volume.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VolumeInfo {
	pub filesystem_type: String,
	pub cluster_size: u32,
	pub clusters: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub free_clusters: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub files: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub volume_name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub volume_serial: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub creation_date: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub modification_date: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub backup_date: Option<DateTime<Utc>>,
	pub dirty: bool,
	pub bootable: bool,
}

impl VolumeInfo {
	pub fn new<S: Into<String>>(filesystem_type: S, cluster_size: u32, clusters: u64) -> Self {
		Self {
			filesystem_type: filesystem_type.into(),
			cluster_size,
			clusters,
			..Default::default()
		}
	}

	/// Appends the fields every format shares to `report`.
	pub fn describe(&self, report: &mut Report) {
		report.line(format_args!("Cluster size: {} bytes", self.cluster_size));
		report.line(format_args!("Clusters: {}", self.clusters));
		if let Some(free) = self.free_clusters {
			report.line(format_args!("Free clusters: {}", free));
		}
		if let Some(files) = self.files {
			report.line(format_args!("Files: {}", files));
		}
		if let Some(name) = &self.volume_name {
			report.line(format_args!("Volume name: {}", name));
		}
		if let Some(serial) = &self.volume_serial {
			report.line(format_args!("Volume serial: {}", serial));
		}
		if let Some(date) = self.creation_date {
			report.line(format_args!("Created: {}", date));
		}
		if let Some(date) = self.modification_date {
			report.line(format_args!("Last modified: {}", date));
		}
		if let Some(date) = self.backup_date {
			report.line(format_args!("Last backed up: {}", date));
		}
		if self.dirty {
			report.line("Volume is dirty");
		}
		if self.bootable {
			report.line("Volume is bootable");
		}
	}
}

/// The human readable half of an information call. Lines are appended in order; warnings are
/// prefixed so that callers can spot inconsistent fields.
#[derive(Debug, Default)]
pub struct Report {
	text: String,
}

impl Report {
	pub fn new<D: Display>(title: D) -> Self {
		let mut report = Self::default();
		report.line(title);
		report
	}

	pub fn line<D: Display>(&mut self, line: D) -> &mut Self {
		self.text.push_str(&line.to_string());
		self.text.push('\n');
		self
	}

	pub fn warn<D: Display>(&mut self, warning: D) -> &mut Self {
		self.line(format_args!("WARNING: {}", warning))
	}

	/// Warns that a field contradicts the rest of the record.
	pub fn corrupt<D: Display>(&mut self, detail: D) -> &mut Self {
		self.warn(ProbeError::StructuralInvariantViolation(detail.to_string()))
	}

	/// Appends the shared fields of `info` and returns the finished text.
	pub fn finish_with(mut self, info: &VolumeInfo) -> String {
		info.describe(&mut self);
		self.text
	}

	pub fn finish(self) -> String {
		self.text
	}
}
