//! Contracts the recorder consumes from the outside world.
//!
//! Persistence, indexing, text extraction, and page-side signalling are not
//! the recorder's business. It hands finished records and page snapshots to
//! these traits and acts on what they report back.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use wr_protocol::Headers;
use wr_runtime::Connection;

use crate::error::Result;
use crate::page::PageInfo;
use crate::request::PendingRequest;

/// Persists finished records and page snapshots.
#[async_trait]
pub trait ArchiveWriter: Send + Sync {
	async fn add_page(&self, page: &PageInfo) -> Result<()>;

	/// Persists one request/response pair.
	///
	/// Returns `true` only when the record was actually stored; a writer may
	/// decline (duplicates, unsupported schemes). Byte counters follow this.
	async fn process_request_response(&self, request: &PendingRequest, payload: Option<&[u8]>, page: &PageInfo) -> bool;
}

/// Full-text indexing. Fire-and-forget.
pub trait PageIndexer: Send + Sync {
	fn add_page_text(&self, page: &PageInfo);
}

/// Turns a DOM snapshot (the `root` node of `DOM.getDocument`) into text.
pub trait TextExtractor: Send + Sync {
	fn extract(&self, root: &Value) -> String;
}

/// Out-of-band resource re-request, sent to the page for 206 responses.
#[derive(Debug, Clone, PartialEq)]
pub struct RefetchRequest {
	pub url: String,
	pub method: String,
	pub headers: Headers,
}

/// Messages from the recorder to the page being recorded.
pub trait PageSignals: Send + Sync {
	/// Asks the page to fetch `request` again so the full body is observed.
	fn request_refetch(&self, request: RefetchRequest);

	/// Periodic recording size, raw and human-readable.
	fn report_size(&self, bytes: u64, display: &str);
}

/// Attachment to the page being recorded.
#[async_trait]
pub trait Debuggee: Send + Sync {
	/// Attaches and returns a started connection whose un-chained commands
	/// reach the page directly.
	async fn attach(&self) -> Result<Arc<Connection>>;

	async fn detach(&self, connection: &Connection) -> Result<()>;
}

/// Indexer that indexes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndexer;

impl PageIndexer for NoopIndexer {
	fn add_page_text(&self, _page: &PageInfo) {}
}

/// Signals that go nowhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSignals;

impl PageSignals for NoopSignals {
	fn request_refetch(&self, _request: RefetchRequest) {}

	fn report_size(&self, _bytes: u64, _display: &str) {}
}

/// The full set of collaborators a recorder talks to.
#[derive(Clone)]
pub struct Collaborators {
	pub writer: Arc<dyn ArchiveWriter>,
	pub indexer: Arc<dyn PageIndexer>,
	pub extractor: Arc<dyn TextExtractor>,
	pub signals: Arc<dyn PageSignals>,
}

impl Collaborators {
	/// Uses `writer` with the DOM text extractor and no-op indexer/signals.
	pub fn with_writer(writer: Arc<dyn ArchiveWriter>) -> Self {
		Self {
			writer,
			indexer: Arc::new(NoopIndexer),
			extractor: Arc::new(crate::text::DomTextExtractor),
			signals: Arc::new(NoopSignals),
		}
	}

	pub fn indexer(mut self, indexer: Arc<dyn PageIndexer>) -> Self {
		self.indexer = indexer;
		self
	}

	pub fn extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
		self.extractor = extractor;
		self
	}

	pub fn signals(mut self, signals: Arc<dyn PageSignals>) -> Self {
		self.signals = signals;
		self
	}
}
