//! Newline-delimited JSON log of what a recording captured.
//!
//! One line per committed page snapshot and per accepted request. Bodies
//! are not stored, only their sizes.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use recorder::{ArchiveWriter, PageInfo, PendingRequest, RecorderError};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Entry<'a> {
	Page(&'a PageInfo),
	Request(RequestEntry<'a>),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestEntry<'a> {
	page_id: &'a str,
	url: &'a str,
	method: &'a str,
	status: Option<u16>,
	#[serde(skip_serializing_if = "Option::is_none")]
	mime_type: Option<&'a str>,
	size: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	post_data_size: Option<usize>,
	#[serde(skip_serializing_if = "Option::is_none")]
	completed_at: Option<String>,
}

/// [`ArchiveWriter`] that appends JSON lines to a file or stdout.
///
/// Declines non-HTTP(S) URLs and repeats of a `(method, url)` pair within
/// the same page.
pub struct ManifestWriter {
	out: Mutex<Box<dyn Write + Send>>,
	seen: Mutex<HashMap<String, HashSet<(String, String)>>>,
	requests: AtomicU64,
	pages: AtomicU64,
}

impl ManifestWriter {
	pub fn new(out: Box<dyn Write + Send>) -> Self {
		Self {
			out: Mutex::new(out),
			seen: Mutex::new(HashMap::new()),
			requests: AtomicU64::new(0),
			pages: AtomicU64::new(0),
		}
	}

	pub fn create(path: &Path) -> io::Result<Self> {
		let file = File::create(path)?;
		Ok(Self::new(Box::new(BufWriter::new(file))))
	}

	pub fn stdout() -> Self {
		Self::new(Box::new(io::stdout()))
	}

	/// Requests written so far.
	pub fn request_count(&self) -> u64 {
		self.requests.load(Ordering::Relaxed)
	}

	/// Page snapshots written so far.
	pub fn page_count(&self) -> u64 {
		self.pages.load(Ordering::Relaxed)
	}

	fn write_entry(&self, entry: &Entry<'_>) -> io::Result<()> {
		let line = serde_json::to_string(entry)?;
		let mut out = self.out.lock();
		out.write_all(line.as_bytes())?;
		out.write_all(b"\n")?;
		out.flush()
	}

	/// Remembers `(method, url)` for `page_id`. `false` if it was already there.
	fn first_sighting(&self, page_id: &str, method: &str, url: &str) -> bool {
		self.seen.lock().entry(page_id.to_string()).or_default().insert((method.to_string(), url.to_string()))
	}
}

#[async_trait]
impl ArchiveWriter for ManifestWriter {
	async fn add_page(&self, page: &PageInfo) -> recorder::Result<()> {
		self.write_entry(&Entry::Page(page)).map_err(|e| RecorderError::Writer(e.to_string()))?;
		self.pages.fetch_add(1, Ordering::Relaxed);
		Ok(())
	}

	async fn process_request_response(&self, request: &PendingRequest, payload: Option<&[u8]>, page: &PageInfo) -> bool {
		if !request.is_http() {
			debug!(target = "wr.cli", url = %request.url(), "skipping non-http record");
			return false;
		}
		if !self.first_sighting(&page.id, request.method(), request.url()) {
			debug!(target = "wr.cli", url = %request.url(), method = request.method(), "skipping duplicate record");
			return false;
		}

		let entry = Entry::Request(RequestEntry {
			page_id: &page.id,
			url: request.url(),
			method: request.method(),
			status: request.status(),
			mime_type: request.mime_type(),
			size: payload.map_or(0, <[u8]>::len),
			post_data_size: request.post_data.as_ref().map(Vec::len),
			completed_at: request.completed_at.map(|at| at.to_rfc3339()),
		});
		match self.write_entry(&entry) {
			Ok(()) => {
				self.requests.fetch_add(1, Ordering::Relaxed);
				true
			}
			Err(e) => {
				warn!(target = "wr.cli", url = %request.url(), error = %e, "failed to write manifest entry");
				false
			}
		}
	}
}
