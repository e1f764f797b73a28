use std::{fs, path::Path, str::FromStr};

use anyhow::{anyhow, Context};
use serde::Deserialize;
use slog::Level;
use superblocks::{Encoding, MediaKind, Partition};

pub const DEFAULT_SECTOR_SIZE: u32 = 512;

/// Settings for a probe run. Loaded from a TOML file, then overridden by command line flags.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeConfig {
	pub sector_size: Option<u32>,
	/// Overrides the media kind guessed from the sector size.
	pub media: Option<MediaKind>,
	pub partition: Option<Partition>,
	pub encoding: Option<String>,
	/// Formats to try. Empty means all of them.
	#[serde(default)]
	pub formats: Vec<String>,
	pub log_level: Option<String>,
}

impl ProbeConfig {
	pub fn load(path: &Path) -> anyhow::Result<Self> {
		let text = fs::read_to_string(path).with_context(|| format!("failed to read config file {}", path.display()))?;
		Self::parse(&text).with_context(|| format!("failed to parse config file {}", path.display()))
	}

	pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(text)
	}

	/// Replaces every setting that `overrides` provides.
	pub fn override_with(&mut self, overrides: ProbeConfig) {
		if overrides.sector_size.is_some() {
			self.sector_size = overrides.sector_size;
		}
		if overrides.media.is_some() {
			self.media = overrides.media;
		}
		if overrides.partition.is_some() {
			self.partition = overrides.partition;
		}
		if overrides.encoding.is_some() {
			self.encoding = overrides.encoding;
		}
		if !overrides.formats.is_empty() {
			self.formats = overrides.formats;
		}
		if overrides.log_level.is_some() {
			self.log_level = overrides.log_level;
		}
	}

	pub fn sector_size(&self) -> anyhow::Result<u32> {
		match self.sector_size.unwrap_or(DEFAULT_SECTOR_SIZE) {
			0 => Err(anyhow!("sector size must not be zero")),
			size => Ok(size),
		}
	}

	pub fn encoding(&self) -> anyhow::Result<Option<Encoding>> {
		self.encoding
			.as_deref()
			.map(|name| Encoding::from_str(name).map_err(|e| anyhow!(e)))
			.transpose()
	}

	pub fn log_level(&self) -> anyhow::Result<Level> {
		match self.log_level.as_deref() {
			Some(name) => Level::from_str(name).map_err(|_| anyhow!("unknown log level: {}", name)),
			None => Ok(Level::Info),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn test_parse_full_config() {
		let config = ProbeConfig::parse(
			r#"
			sector_size = 2048
			media = "optical"
			encoding = "koi8-r"
			formats = ["xfs", "opera"]
			log_level = "debug"

			[partition]
			start = 16
			end = 1023
			"#,
		)
		.unwrap();

		assert_eq!(config.sector_size().unwrap(), 2048);
		assert_eq!(config.media, Some(MediaKind::Optical));
		assert_eq!(config.partition, Some(Partition::new(16, 1023)));
		assert_eq!(config.encoding().unwrap(), Some(Encoding::Koi8R));
		assert_eq!(config.formats, ["xfs", "opera"]);
		assert_eq!(config.log_level().unwrap(), Level::Debug);
	}

	#[test]
	fn test_defaults() {
		let config = ProbeConfig::parse("").unwrap();
		assert_eq!(config, ProbeConfig::default());
		assert_eq!(config.sector_size().unwrap(), DEFAULT_SECTOR_SIZE);
		assert_eq!(config.encoding().unwrap(), None);
		assert_eq!(config.log_level().unwrap(), Level::Info);
	}

	#[test]
	fn test_unknown_keys_are_rejected() {
		assert!(ProbeConfig::parse("sectorsize = 512").is_err());
	}

	#[test]
	fn test_bad_values() {
		let config = ProbeConfig {
			sector_size: Some(0),
			encoding: Some("ebcdic".to_string()),
			log_level: Some("loud".to_string()),
			..Default::default()
		};
		assert!(config.sector_size().is_err());
		assert!(config.encoding().unwrap_err().to_string().contains("ebcdic"));
		assert!(config.log_level().is_err());
	}

	#[test]
	fn test_flags_override_file() {
		let mut config = ProbeConfig::parse("sector_size = 2048\nformats = [\"xfs\"]\nencoding = \"utf-8\"").unwrap();
		config.override_with(ProbeConfig {
			sector_size: Some(512),
			partition: Some(Partition::new(0, 99)),
			..Default::default()
		});

		assert_eq!(config.sector_size, Some(512));
		assert_eq!(config.partition, Some(Partition::new(0, 99)));
		assert_eq!(config.formats, ["xfs"]);
		assert_eq!(config.encoding().unwrap(), Some(Encoding::Utf8));
	}

	#[test]
	fn test_load_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "encoding = \"mac-roman\"").unwrap();
		let config = ProbeConfig::load(file.path()).unwrap();
		assert_eq!(config.encoding().unwrap(), Some(Encoding::MacRoman));

		let err = ProbeConfig::load(Path::new("/nonexistent/probe.toml")).unwrap_err();
		assert!(err.to_string().contains("failed to read config file"));
	}
}
