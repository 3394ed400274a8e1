use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bytes committed across every recording in the process.
///
/// Cloning shares the counter.
#[derive(Debug, Clone, Default)]
pub struct ArchiveSize(Arc<AtomicU64>);

impl ArchiveSize {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds `bytes` and returns the new total.
	pub fn add(&self, bytes: u64) -> u64 {
		self.0.fetch_add(bytes, Ordering::Relaxed) + bytes
	}

	pub fn get(&self) -> u64 {
		self.0.load(Ordering::Relaxed)
	}
}

const UNITS: &[&str] = &["B", "kB", "MB", "GB", "TB", "PB"];

/// Human-readable size with decimal units and three significant digits,
/// e.g. `1.2 MB`, `999 B`, `13.4 kB`.
pub fn format_bytes(bytes: u64) -> String {
	if bytes < 1000 {
		return format!("{bytes} B");
	}

	let mut value = bytes as f64;
	let mut unit = 0;
	while value >= 1000.0 && unit + 1 < UNITS.len() {
		value /= 1000.0;
		unit += 1;
	}

	let digits = if value >= 100.0 {
		0
	} else if value >= 10.0 {
		1
	} else {
		2
	};
	let mut number = format!("{value:.digits$}");
	if number.contains('.') {
		number = number.trim_end_matches('0').trim_end_matches('.').to_string();
	}
	format!("{number} {}", UNITS[unit])
}
