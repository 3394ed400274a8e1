//! A scripted browser for driving a recorder end to end.
//!
//! [`FakeBrowser`] answers every command the recorder sends over the fake
//! transport. Nested `Target.sendMessageToTarget` envelopes are peeled and
//! acknowledged level by level, and the innermost command is answered
//! through the same chain of `Target.receivedMessageFromTarget` wrappers a
//! real browser would use.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use recorder::{ArchiveWriter, Collaborators, Debuggee, PageInfo, PageSignals, PendingRequest, RecorderConfig, RefetchRequest};
use serde_json::{Value, json};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use wr_protocol::SessionId;
use wr_runtime::router::wrap_from_chain;
use wr_runtime::{Connection, FakeTransportBuilder, FakeTransportController, SessionChain};

const SEND_MESSAGE: &str = "Target.sendMessageToTarget";

/// One command as the browser saw it, after unwrapping.
#[derive(Debug, Clone)]
pub struct Call {
	pub chain: Vec<String>,
	pub method: String,
	pub params: Value,
}

enum Reply {
	Result(Value),
	Error(String),
	Silent,
}

#[derive(Default)]
struct Script {
	calls: Mutex<Vec<Call>>,
	failing: Mutex<HashSet<String>>,
	silent: Mutex<HashSet<String>>,
	network_bodies: Mutex<HashMap<String, Vec<u8>>>,
	fetch_bodies: Mutex<HashMap<String, Vec<u8>>>,
	history: Mutex<Option<Value>>,
}

impl Script {
	fn reply(&self, method: &str, params: &Value) -> Reply {
		if self.silent.lock().contains(method) {
			return Reply::Silent;
		}
		if self.failing.lock().contains(method) {
			return Reply::Error(format!("{method} failed"));
		}
		let request_id = params["requestId"].as_str().unwrap_or_default();
		match method {
			"Network.getResponseBody" => body_reply(self.network_bodies.lock().get(request_id)),
			"Fetch.getResponseBody" => body_reply(self.fetch_bodies.lock().get(request_id)),
			"Network.getRequestPostData" => Reply::Error("No post data available for the request".to_string()),
			"Page.getNavigationHistory" => Reply::Result(self.history.lock().clone().unwrap_or_else(|| history(0, &[("https://example.com/", "Example")]))),
			"DOM.getDocument" => Reply::Result(json!({ "root": document("Hello recorded world") })),
			_ => Reply::Result(json!({})),
		}
	}
}

fn body_reply(body: Option<&Vec<u8>>) -> Reply {
	match body {
		Some(bytes) => Reply::Result(json!({ "body": STANDARD.encode(bytes), "base64Encoded": true })),
		None => Reply::Error("No resource with given identifier found".to_string()),
	}
}

/// `Page.getNavigationHistory` result.
pub fn history(current_index: usize, entries: &[(&str, &str)]) -> Value {
	let entries: Vec<Value> = entries
		.iter()
		.enumerate()
		.map(|(i, (url, title))| json!({ "id": i + 1, "url": url, "title": title }))
		.collect();
	json!({ "currentIndex": current_index, "entries": entries })
}

/// A document whose body holds a single text node.
pub fn document(text: &str) -> Value {
	json!({
		"nodeType": 9,
		"nodeName": "#document",
		"children": [{
			"nodeType": 1,
			"nodeName": "HTML",
			"children": [{
				"nodeType": 1,
				"nodeName": "BODY",
				"children": [{ "nodeType": 3, "nodeName": "#text", "nodeValue": text }]
			}]
		}]
	})
}

pub fn chain(sessions: &[&str]) -> SessionChain {
	SessionChain::from(sessions.iter().map(|s| SessionId::new(*s)).collect::<Vec<_>>())
}

pub struct FakeBrowser {
	transport: Arc<FakeTransportController>,
	script: Arc<Script>,
	responder: JoinHandle<()>,
}

impl FakeBrowser {
	/// Starts the browser and returns it with a started connection to it.
	pub fn start() -> (Self, Arc<Connection>) {
		let (parts, transport) = FakeTransportBuilder::new().build();
		let connection = Connection::new(parts).start();
		let transport = Arc::new(transport);
		let script = Arc::new(Script::default());
		let responder = tokio::spawn(respond(Arc::clone(&transport), Arc::clone(&script)));
		(
			Self {
				transport,
				script,
				responder,
			},
			connection,
		)
	}

	pub fn event(&self, method: &str, params: Value) {
		self.transport.inject_event(method, params);
	}

	/// Emits an event from the innermost session of `sessions`.
	pub fn nested_event(&self, sessions: &[&str], method: &str, params: Value) {
		let event = json!({ "method": method, "params": params });
		self.transport.inject(wrap_from_chain(event, &chain(sessions)));
	}

	/// Drops the connection from the browser side.
	pub fn close(&self) {
		self.transport.close();
	}

	pub fn fail(&self, method: &str) {
		self.script.failing.lock().insert(method.to_string());
	}

	/// Never answers `method`.
	pub fn silence(&self, method: &str) {
		self.script.silent.lock().insert(method.to_string());
	}

	pub fn set_network_body(&self, request_id: &str, body: &[u8]) {
		self.script.network_bodies.lock().insert(request_id.to_string(), body.to_vec());
	}

	pub fn set_fetch_body(&self, interception_id: &str, body: &[u8]) {
		self.script.fetch_bodies.lock().insert(interception_id.to_string(), body.to_vec());
	}

	pub fn set_history(&self, history: Value) {
		*self.script.history.lock() = Some(history);
	}

	pub fn calls(&self) -> Vec<Call> {
		self.script.calls.lock().clone()
	}

	pub fn calls_to(&self, method: &str) -> Vec<Call> {
		self.calls().into_iter().filter(|call| call.method == method).collect()
	}

	pub fn methods(&self) -> Vec<String> {
		self.calls().into_iter().map(|call| call.method).collect()
	}

	pub fn count(&self, method: &str) -> usize {
		self.calls_to(method).len()
	}
}

impl Drop for FakeBrowser {
	fn drop(&mut self) {
		self.responder.abort();
	}
}

async fn respond(transport: Arc<FakeTransportController>, script: Arc<Script>) {
	while let Some(sent) = transport.next_sent().await {
		let Some(id) = sent["id"].as_u64() else {
			continue;
		};
		let mut method = sent["method"].as_str().unwrap_or_default().to_string();
		let mut params = sent["params"].clone();
		let mut message_id = id;
		let mut sessions: Vec<String> = Vec::new();

		if method == SEND_MESSAGE {
			transport.inject_response(id, json!({}));
		}
		while method == SEND_MESSAGE {
			let session = params["sessionId"].as_str().unwrap_or_default().to_string();
			let inner: Value = serde_json::from_str(params["message"].as_str().unwrap_or("{}")).unwrap_or_default();
			sessions.push(session);

			message_id = inner["id"].as_u64().unwrap_or_default();
			method = inner["method"].as_str().unwrap_or_default().to_string();
			params = inner["params"].clone();
			if method == SEND_MESSAGE {
				let ack = json!({ "id": message_id, "result": {} });
				transport.inject(wrap_from_chain(ack, &chain_of(&sessions)));
			}
		}

		let reply = script.reply(&method, &params);
		script.calls.lock().push(Call {
			chain: sessions.clone(),
			method: method.clone(),
			params,
		});

		let message = match reply {
			Reply::Result(result) => json!({ "id": message_id, "result": result }),
			Reply::Error(message) => json!({ "id": message_id, "error": { "code": -32000, "message": message } }),
			Reply::Silent => continue,
		};
		transport.inject(wrap_from_chain(message, &chain_of(&sessions)));
	}
}

fn chain_of(sessions: &[String]) -> SessionChain {
	SessionChain::from(sessions.iter().map(SessionId::new).collect::<Vec<_>>())
}

/// Debuggee over an existing connection that counts attaches and detaches.
pub struct FakeDebuggee {
	connection: Arc<Connection>,
	attaches: AtomicUsize,
	detaches: AtomicUsize,
	/// When set, `attach` waits for [`FakeDebuggee::open`].
	gate: Option<Notify>,
}

impl FakeDebuggee {
	pub fn new(connection: Arc<Connection>) -> Arc<Self> {
		Self::build(connection, None)
	}

	/// A debuggee whose `attach` blocks until [`FakeDebuggee::open`] is called.
	pub fn gated(connection: Arc<Connection>) -> Arc<Self> {
		Self::build(connection, Some(Notify::new()))
	}

	fn build(connection: Arc<Connection>, gate: Option<Notify>) -> Arc<Self> {
		Arc::new(Self {
			connection,
			attaches: AtomicUsize::new(0),
			detaches: AtomicUsize::new(0),
			gate,
		})
	}

	pub fn open(&self) {
		if let Some(gate) = &self.gate {
			gate.notify_one();
		}
	}

	pub fn attaches(&self) -> usize {
		self.attaches.load(Ordering::SeqCst)
	}

	pub fn detaches(&self) -> usize {
		self.detaches.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Debuggee for FakeDebuggee {
	async fn attach(&self) -> recorder::Result<Arc<Connection>> {
		self.attaches.fetch_add(1, Ordering::SeqCst);
		if let Some(gate) = &self.gate {
			gate.notified().await;
		}
		Ok(Arc::clone(&self.connection))
	}

	async fn detach(&self, _connection: &Connection) -> recorder::Result<()> {
		self.detaches.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

/// What the writer was handed for one request.
#[derive(Debug, Clone)]
pub struct Written {
	pub record: PendingRequest,
	pub payload: Option<Vec<u8>>,
	pub page_id: String,
}

#[derive(Default)]
pub struct RecordingWriter {
	decline: bool,
	pages: Mutex<Vec<PageInfo>>,
	records: Mutex<Vec<Written>>,
}

impl RecordingWriter {
	pub fn declining() -> Self {
		Self {
			decline: true,
			..Self::default()
		}
	}

	pub fn pages(&self) -> Vec<PageInfo> {
		self.pages.lock().clone()
	}

	pub fn finished_pages(&self) -> Vec<PageInfo> {
		self.pages().into_iter().filter(|page| page.finished).collect()
	}

	pub fn records(&self) -> Vec<Written> {
		self.records.lock().clone()
	}

	pub fn record_for(&self, url: &str) -> Option<Written> {
		self.records().into_iter().find(|written| written.record.url() == url)
	}
}

#[async_trait]
impl ArchiveWriter for RecordingWriter {
	async fn add_page(&self, page: &PageInfo) -> recorder::Result<()> {
		self.pages.lock().push(page.clone());
		Ok(())
	}

	async fn process_request_response(&self, request: &PendingRequest, payload: Option<&[u8]>, page: &PageInfo) -> bool {
		self.records.lock().push(Written {
			record: request.clone(),
			payload: payload.map(<[u8]>::to_vec),
			page_id: page.id.clone(),
		});
		!self.decline
	}
}

#[derive(Default)]
pub struct RecordingSignals {
	refetches: Mutex<Vec<RefetchRequest>>,
	sizes: Mutex<Vec<u64>>,
}

impl RecordingSignals {
	pub fn refetches(&self) -> Vec<RefetchRequest> {
		self.refetches.lock().clone()
	}

	pub fn sizes(&self) -> Vec<u64> {
		self.sizes.lock().clone()
	}
}

impl PageSignals for RecordingSignals {
	fn request_refetch(&self, request: RefetchRequest) {
		self.refetches.lock().push(request);
	}

	fn report_size(&self, bytes: u64, _display: &str) {
		self.sizes.lock().push(bytes);
	}
}

pub struct Doubles {
	pub writer: Arc<RecordingWriter>,
	pub signals: Arc<RecordingSignals>,
	pub collaborators: Collaborators,
}

impl Doubles {
	pub fn new(writer: RecordingWriter) -> Self {
		let writer = Arc::new(writer);
		let signals = Arc::new(RecordingSignals::default());
		let collaborators = Collaborators::with_writer(Arc::clone(&writer) as Arc<dyn ArchiveWriter>).signals(Arc::clone(&signals) as Arc<dyn PageSignals>);
		Self { writer, signals, collaborators }
	}
}

impl Default for Doubles {
	fn default() -> Self {
		Self::new(RecordingWriter::default())
	}
}

/// Fast timers, no reload after attach.
pub fn test_config() -> RecorderConfig {
	RecorderConfig {
		size_report_interval_ms: 60_000,
		partial_refetch_delay_ms: 10,
		command_timeout_ms: 2_000,
		reload_on_attach: false,
		..RecorderConfig::default()
	}
}

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::DEBUG).try_init();
}

/// Polls `condition` until it holds, panicking after a few seconds.
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
	for _ in 0..300 {
		if condition() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("timed out waiting for {what}");
}

/// Lets spawned handlers run for a moment, for asserting that something
/// did not happen.
pub async fn settle() {
	tokio::time::sleep(Duration::from_millis(100)).await;
}
