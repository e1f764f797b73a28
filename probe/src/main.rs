mod config;

use std::{
	io::{stderr, stdout, Write},
	path::PathBuf,
	process::ExitCode,
};

use anyhow::{bail, Context};
use clap::Parser;
use common::obs::assemble_filtered_logger;
use config::ProbeConfig;
use serde::Serialize;
use slog::{debug, o};
use superblocks::{FileImage, Information, Partition, Registry, SectorSource};

#[derive(Parser)]
#[command(about = "identify the filesystem on a disk image")]
struct Cli {
	image: PathBuf,

	#[arg(long, help = "size of a sector in bytes (default 512)")]
	sector_size: Option<u32>,

	#[arg(long, requires = "end", help = "first sector of the partition")]
	start: Option<u64>,

	#[arg(long, requires = "start", help = "last sector of the partition")]
	end: Option<u64>,

	#[arg(long, help = "treat the image as optical media")]
	optical: bool,

	#[arg(short, long, help = "encoding of volume labels, e.g. latin1, utf-8, koi8-r")]
	encoding: Option<String>,

	#[arg(short, long = "format", help = "only try the given format (repeatable)")]
	formats: Vec<String>,

	#[arg(short, long, help = "path to a TOML config file")]
	config: Option<PathBuf>,

	#[arg(long, help = "log level for diagnostics on stderr")]
	log_level: Option<String>,

	#[arg(long, help = "print the results as JSON")]
	json: bool,
}

impl Cli {
	fn overrides(&self) -> ProbeConfig {
		ProbeConfig {
			sector_size: self.sector_size,
			media: self.optical.then_some(superblocks::MediaKind::Optical),
			partition: self.start.zip(self.end).map(|(start, end)| Partition::new(start, end)),
			encoding: self.encoding.clone(),
			formats: self.formats.clone(),
			log_level: self.log_level.clone(),
		}
	}
}

#[derive(Serialize)]
struct Match<'a> {
	format: &'static str,
	description: &'static str,
	#[serde(flatten)]
	information: &'a Information,
}

/// Probes the image. Returns false when no format matched.
fn run(cli: Cli) -> anyhow::Result<bool> {
	let mut config = match &cli.config {
		Some(path) => ProbeConfig::load(path)?,
		None => ProbeConfig::default(),
	};
	config.override_with(cli.overrides());

	let logger = assemble_filtered_logger(stderr(), config.log_level()?);
	let encoding = config.encoding()?;

	let mut image = FileImage::open(&cli.image, config.sector_size()?)
		.with_context(|| format!("failed to open {}", cli.image.display()))?;
	if let Some(media) = config.media {
		image = image.with_media(media);
	}

	let partition = config.partition.unwrap_or_else(|| Partition::whole(&image));
	if image.sector_count() == 0 {
		bail!("{} is smaller than one sector", image.path().display());
	}
	if partition.start > partition.end || partition.end >= image.sector_count() {
		bail!(
			"partition {}..={} does not fit in the {} sectors of {}",
			partition.start,
			partition.end,
			image.sector_count(),
			image.path().display()
		);
	}

	let logger = logger.new(o!("image" => image.path().display().to_string()));
	debug!(logger, "probing"; "sector_size" => image.sector_size(), "start" => partition.start, "end" => partition.end);

	let mut registry = Registry::new(logger);
	if !config.formats.is_empty() {
		registry = registry.with_formats(&config.formats)?;
	}

	let results = registry.probe(&image, partition, encoding);
	let mut out = stdout().lock();

	if cli.json {
		let matches: Vec<_> = results
			.iter()
			.map(|(fs, information)| Match {
				format: fs.name(),
				description: fs.description(),
				information,
			})
			.collect();
		serde_json::to_writer_pretty(&mut out, &matches)?;
		writeln!(out)?;
	} else {
		for (i, (_, information)) in results.iter().enumerate() {
			if i > 0 {
				writeln!(out)?;
			}
			write!(out, "{}", information.text)?;
		}
	}

	if results.is_empty() {
		eprintln!("probe: no known filesystem found on {}", image.path().display());
		return Ok(false);
	}

	Ok(true)
}

fn main() -> ExitCode {
	let cli = Cli::parse();

	match run(cli) {
		Ok(true) => ExitCode::SUCCESS,
		Ok(false) => ExitCode::FAILURE,
		Err(e) => {
			eprintln!("probe: Error: {:#}", e);
			ExitCode::FAILURE
		}
	}
}

#[cfg(test)]
mod tests {
	use clap::CommandFactory;

	use super::*;

	#[test]
	fn test_cli_is_well_formed() {
		Cli::command().debug_assert();
	}

	#[test]
	fn test_flags_become_overrides() {
		let cli = Cli::parse_from([
			"probe",
			"disk.img",
			"--sector-size",
			"2048",
			"--start",
			"4",
			"--end",
			"99",
			"--format",
			"xfs",
			"--format",
			"ext",
			"--optical",
		]);
		let overrides = cli.overrides();
		assert_eq!(overrides.sector_size, Some(2048));
		assert_eq!(overrides.partition, Some(Partition::new(4, 99)));
		assert_eq!(overrides.formats, ["xfs", "ext"]);
		assert_eq!(overrides.media, Some(superblocks::MediaKind::Optical));
		assert_eq!(overrides.encoding, None);
	}

	#[test]
	fn test_partition_needs_both_ends() {
		assert!(Cli::try_parse_from(["probe", "disk.img", "--start", "4"]).is_err());
	}

	#[test]
	fn test_probe_an_image() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		let mut data = vec![0u8; 4096];
		// An empty big endian XFS superblock with 4KiB blocks and one allocation group.
		data[0..4].copy_from_slice(b"XFSB");
		data[4..8].copy_from_slice(&4096u32.to_be_bytes());
		data[8..16].copy_from_slice(&1024u64.to_be_bytes());
		data[88..92].copy_from_slice(&1u32.to_be_bytes());
		file.write_all(&data).unwrap();

		let path = file.path().to_string_lossy().into_owned();
		assert!(run(Cli::parse_from(["probe", path.as_str(), "--json"])).unwrap());
		assert!(!run(Cli::parse_from(["probe", path.as_str(), "--format", "ext"])).unwrap());

		let blank = tempfile::NamedTempFile::new().unwrap();
		blank.as_file().set_len(4096).unwrap();
		let path = blank.path().to_string_lossy().into_owned();
		assert!(!run(Cli::parse_from(["probe", path.as_str()])).unwrap());
	}

	#[test]
	fn test_partition_past_the_end_is_an_error() {
		let file = tempfile::NamedTempFile::new().unwrap();
		file.as_file().set_len(4096).unwrap();
		let path = file.path().to_string_lossy().into_owned();
		let cli = Cli::parse_from(["probe", path.as_str(), "--start", "0", "--end", "8"]);
		assert!(run(cli).unwrap_err().to_string().contains("does not fit"));
	}
}
