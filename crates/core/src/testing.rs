//! Doubles shared by the unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use wr_runtime::{Connection, FakeTransportBuilder, FakeTransportController, SessionRouter};

use crate::collaborators::{ArchiveWriter, PageSignals, RefetchRequest};
use crate::error::Result;
use crate::page::PageInfo;
use crate::request::PendingRequest;

pub(crate) fn parse<T: DeserializeOwned>(value: Value) -> T {
	serde_json::from_value(value).unwrap()
}

pub(crate) fn fake_router() -> (Arc<SessionRouter>, Arc<FakeTransportController>) {
	let (parts, controller) = FakeTransportBuilder::new().build();
	let connection = Connection::new(parts).start();
	(Arc::new(SessionRouter::new(connection)), Arc::new(controller))
}

/// Answers the next outbound command with `result` and returns it.
pub(crate) async fn reply_next(controller: &FakeTransportController, result: Value) -> Value {
	let command = controller.next_sent().await.unwrap();
	controller.inject_response(command["id"].as_u64().unwrap(), result);
	command
}

pub(crate) struct MemoryWriter {
	accept: bool,
	pages: Mutex<Vec<PageInfo>>,
	records: Mutex<Vec<(PendingRequest, Option<Vec<u8>>)>>,
}

impl Default for MemoryWriter {
	fn default() -> Self {
		Self {
			accept: true,
			pages: Mutex::new(Vec::new()),
			records: Mutex::new(Vec::new()),
		}
	}
}

impl MemoryWriter {
	pub(crate) fn declining() -> Self {
		Self {
			accept: false,
			..Self::default()
		}
	}

	pub(crate) fn pages(&self) -> Vec<PageInfo> {
		self.pages.lock().clone()
	}

	pub(crate) fn records(&self) -> Vec<(PendingRequest, Option<Vec<u8>>)> {
		self.records.lock().clone()
	}
}

#[async_trait]
impl ArchiveWriter for MemoryWriter {
	async fn add_page(&self, page: &PageInfo) -> Result<()> {
		self.pages.lock().push(page.clone());
		Ok(())
	}

	async fn process_request_response(&self, request: &PendingRequest, payload: Option<&[u8]>, _page: &PageInfo) -> bool {
		self.records.lock().push((request.clone(), payload.map(<[u8]>::to_vec)));
		self.accept
	}
}

#[derive(Default)]
pub(crate) struct MemorySignals {
	pub(crate) refetches: Mutex<Vec<RefetchRequest>>,
	pub(crate) sizes: Mutex<Vec<(u64, String)>>,
}

impl PageSignals for MemorySignals {
	fn request_refetch(&self, request: RefetchRequest) {
		self.refetches.lock().push(request);
	}

	fn report_size(&self, bytes: u64, display: &str) {
		self.sizes.lock().push((bytes, display.to_string()));
	}
}
