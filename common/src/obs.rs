use std::{io::Write, sync::Mutex};

use slog::{o, Drain, Level, LevelFilter};

/// Assemble a logger that writes to the given writer.
pub fn assemble_logger<W: Write + Send + 'static>(w: W) -> slog::Logger {
	assemble_filtered_logger(w, Level::Trace)
}

/// Assemble a logger that writes records at `level` or above to the given writer.
pub fn assemble_filtered_logger<W: Write + Send + 'static>(w: W, level: Level) -> slog::Logger {
	let drain = Mutex::new(slog_json::Json::default(w)).fuse();
	slog::Logger::root(LevelFilter::new(drain, level).fuse(), o!())
}

#[cfg(test)]
mod tests {
	use std::{
		io,
		sync::{Arc, Mutex},
	};

	use slog::{debug, info, warn};

	use super::*;

	#[derive(Clone, Default)]
	struct Shared(Arc<Mutex<Vec<u8>>>);

	impl Write for Shared {
		fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
			self.0.lock().unwrap().extend_from_slice(buf);
			Ok(buf.len())
		}

		fn flush(&mut self) -> io::Result<()> {
			Ok(())
		}
	}

	impl Shared {
		fn lines(&self) -> Vec<String> {
			String::from_utf8(self.0.lock().unwrap().clone())
				.unwrap()
				.lines()
				.map(str::to_string)
				.collect()
		}
	}

	#[test]
	fn test_records_are_json() {
		let out = Shared::default();
		let logger = assemble_logger(out.clone());
		info!(logger, "probed"; "format" => "xfs");

		let lines = out.lines();
		assert_eq!(lines.len(), 1);
		assert!(lines[0].starts_with('{'));
		assert!(lines[0].contains("\"msg\":\"probed\""));
		assert!(lines[0].contains("\"format\":\"xfs\""));
	}

	#[test]
	fn test_level_filter() {
		let out = Shared::default();
		let logger = assemble_filtered_logger(out.clone(), Level::Info);
		debug!(logger, "hidden");
		info!(logger, "shown");
		warn!(logger, "also shown");

		let lines = out.lines();
		assert_eq!(lines.len(), 2);
		assert!(lines.iter().all(|line| !line.contains("hidden")));
	}
}
