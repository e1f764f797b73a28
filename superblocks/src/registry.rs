use slog::{debug, error, info, o, Discard, Logger};

use crate::{
	error::ProbeError,
	formats::ALL,
	normalize::Encoding,
	source::{Partition, SectorSource},
	types::{Filesystem, Information, Volume},
};

/// The set of probes a caller runs against a source.
pub struct Registry {
	formats: Vec<&'static dyn Filesystem>,
	logger: Logger,
}

impl Default for Registry {
	fn default() -> Self {
		Self::new(Logger::root(Discard, o!()))
	}
}

impl Registry {
	/// A registry holding every known format.
	pub fn new(logger: Logger) -> Self {
		Self {
			formats: ALL.to_vec(),
			logger,
		}
	}

	/// Keeps only the formats with the given names, in catalog order.
	pub fn with_formats<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self, ProbeError> {
		if let Some(unknown) = names.iter().find(|name| !ALL.iter().any(|fs| fs.name() == name.as_ref())) {
			return Err(ProbeError::UnknownFormat(unknown.as_ref().to_string()));
		}

		self.formats.retain(|fs| names.iter().any(|name| name.as_ref() == fs.name()));
		Ok(self)
	}

	pub fn formats(&self) -> &[&'static dyn Filesystem] {
		&self.formats
	}

	fn volume<'a>(&self, source: &'a dyn SectorSource, partition: Partition, fs: &dyn Filesystem) -> Volume<'a> {
		Volume::new(source, partition).with_logger(self.logger.new(o!("format" => fs.name())))
	}

	/// Returns every format that recognises the partition.
	pub fn identify(&self, source: &dyn SectorSource, partition: Partition) -> Vec<&'static dyn Filesystem> {
		self.formats
			.iter()
			.copied()
			.filter(|fs| {
				let found = fs.identify(&self.volume(source, partition, *fs));
				debug!(self.logger, "probed"; "format" => fs.name(), "found" => found);
				found
			})
			.collect()
	}

	/// Describes the partition as `fs`. Failures are logged and give an empty result.
	pub fn information(
		&self,
		fs: &dyn Filesystem,
		source: &dyn SectorSource,
		partition: Partition,
		encoding: Option<Encoding>,
	) -> Information {
		match fs.information(&self.volume(source, partition, fs), encoding) {
			Ok(information) => information,
			Err(e) if e.is_mismatch() => {
				debug!(self.logger, "format not present"; "format" => fs.name(), "error" => e.to_string());
				Information::default()
			}
			Err(e) => {
				error!(self.logger, "failed to describe volume"; "format" => fs.name(), "error" => e.to_string());
				Information::default()
			}
		}
	}

	/// Identifies the partition and describes it as every format that matched.
	pub fn probe(
		&self,
		source: &dyn SectorSource,
		partition: Partition,
		encoding: Option<Encoding>,
	) -> Vec<(&'static dyn Filesystem, Information)> {
		let matches = self.identify(source, partition);
		info!(self.logger, "identified partition"; "start" => partition.start, "end" => partition.end, "matches" => matches.len());

		matches
			.into_iter()
			.map(|fs| (fs, self.information(fs, source, partition, encoding)))
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{formats::samples, source::MemoryImage};

	#[test]
	fn test_every_sample_is_identified() {
		let registry = Registry::default();
		for (name, image) in samples() {
			let matches = registry.identify(&image, Partition::whole(&image));
			assert!(
				matches.iter().any(|fs| fs.name() == name),
				"{} sample was not identified, got {:?}",
				name,
				matches.iter().map(|fs| fs.name()).collect::<Vec<_>>()
			);
		}
	}

	#[test]
	fn test_every_sample_has_geometry() {
		let registry = Registry::default();
		for (name, image) in samples() {
			let registry = Registry::default().with_formats(&[name]).unwrap();
			let results = registry.probe(&image, Partition::whole(&image), None);
			assert_eq!(results.len(), 1, "{}", name);

			let (fs, info) = &results[0];
			assert_eq!(fs.name(), name);
			assert!(info.metadata.cluster_size > 0, "{} has no cluster size", name);
			assert!(info.metadata.clusters > 0, "{} has no clusters", name);
			assert!(!info.text.is_empty(), "{} has no summary", name);
		}
		assert_eq!(registry.formats().len(), ALL.len());
	}

	#[test]
	fn test_descriptors_fit_their_records() {
		for fs in ALL {
			for record in fs.records() {
				assert_eq!(record.overflowing_field(), None, "{}: {}", fs.name(), record.name);
			}
		}
	}

	#[test]
	fn test_names_are_unique() {
		let mut names: Vec<_> = ALL.iter().map(|fs| fs.name()).collect();
		names.sort_unstable();
		names.dedup();
		assert_eq!(names.len(), ALL.len());
	}

	#[test]
	fn test_unknown_format_is_rejected() {
		let err = Registry::default().with_formats(&["ext", "fat"]).err().unwrap();
		assert!(matches!(err, ProbeError::UnknownFormat(name) if name == "fat"));
	}

	#[test]
	fn test_with_formats_keeps_catalog_order() {
		let registry = Registry::default().with_formats(&["opera", "xfs"]).unwrap();
		let names: Vec<_> = registry.formats().iter().map(|fs| fs.name()).collect();
		assert_eq!(names, ["xfs", "opera"]);
	}

	#[test]
	fn test_blank_image_matches_nothing() {
		let image = MemoryImage::new(vec![0; 200 * 512], 512);
		let registry = Registry::default();
		assert!(registry.identify(&image, Partition::whole(&image)).is_empty());
		assert!(registry.probe(&image, Partition::whole(&image), None).is_empty());
	}

	#[test]
	fn test_information_on_wrong_format_is_empty() {
		let image = MemoryImage::new(vec![0; 8 * 512], 512);
		let registry = Registry::default();
		let info = registry.information(ALL[1], &image, Partition::whole(&image), None);
		assert!(info.text.is_empty());
		assert_eq!(info.metadata.clusters, 0);
	}
}
