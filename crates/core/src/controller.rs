//! One recorder per target: attachment, session bootstrap, event dispatch.
//!
//! # Event handling
//!
//! A single task consumes the connection's events in delivery order. Each
//! event's synchronous part (merging into the request table, starting a
//! page, registering a session, unwrapping a nested message) runs inline,
//! so per-session ordering holds. Anything that awaits a protocol reply runs
//! on its own task, which keeps the loop free to unwrap the nested replies
//! those tasks are waiting on.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use wr_protocol::{
	AddScriptToEvaluateOnNewDocument, ContinueRequest, DetachFromTarget, Evaluate, Event, FetchDisable, FetchEnable, FulfillRequest, NetworkDisable, NetworkEnable, PageEnable, RequestPaused, RpcEvent, RunIfWaitingForDebugger,
	SessionId, SetAutoAttach, SetCacheDisabled, TARGET_CRASHED, TargetId, content_type,
};
use wr_runtime::{Connection, SessionChain, SessionRouter, Unwrapped};

use crate::collaborators::{Collaborators, Debuggee, PageSignals};
use crate::config::RecorderConfig;
use crate::error::Result;
use crate::page::{PageInfo, PageLifecycle};
use crate::request::PendingRequest;
use crate::rewrite::ResponseRewriter;
use crate::size::{ArchiveSize, format_bytes};
use crate::tracker::{BodySource, RequestTracker};

/// Lifecycle of a recorder as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderStatus {
	Detached,
	Running,
	/// Stopped on request.
	Stopped,
	/// The target went away; the recorder will not be resumed.
	TargetClosed,
}

impl RecorderStatus {
	pub fn is_ended(self) -> bool {
		matches!(self, Self::Stopped | Self::TargetClosed)
	}
}

/// Metadata of an attached sub-target session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
	pub target_type: String,
	pub url: String,
	/// Route to the sub-target, outermost session first.
	pub chain: SessionChain,
}

/// Records one target.
pub struct RecorderController {
	target: TargetId,
	debuggee: Arc<dyn Debuggee>,
	config: RecorderConfig,
	collaborators: Collaborators,
	rewriter: Arc<ResponseRewriter>,
	archive_size: ArchiveSize,
	size: Arc<AtomicU64>,
	running: AtomicBool,
	attachment: Mutex<Option<Attachment>>,
	status: watch::Sender<RecorderStatus>,
}

struct Attachment {
	connection: Arc<Connection>,
	recording: Arc<Recording>,
	event_loop: JoinHandle<()>,
	size_timer: JoinHandle<()>,
}

impl RecorderController {
	pub fn new(target: TargetId, debuggee: Arc<dyn Debuggee>, config: RecorderConfig, collaborators: Collaborators, archive_size: ArchiveSize) -> Result<Arc<Self>> {
		let rewriter = Arc::new(ResponseRewriter::new(&config.rewrite)?);
		let (status, _) = watch::channel(RecorderStatus::Detached);
		Ok(Arc::new(Self {
			target,
			debuggee,
			config,
			collaborators,
			rewriter,
			archive_size,
			size: Arc::new(AtomicU64::new(0)),
			running: AtomicBool::new(false),
			attachment: Mutex::new(None),
			status,
		}))
	}

	pub fn target(&self) -> &TargetId {
		&self.target
	}

	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::SeqCst)
	}

	pub fn status(&self) -> RecorderStatus {
		*self.status.borrow()
	}

	/// Bytes committed by the current (or last) recording.
	pub fn size(&self) -> u64 {
		self.size.load(Ordering::Relaxed)
	}

	/// Waits until the recording stops or the target closes.
	pub async fn ended(&self) -> RecorderStatus {
		let mut status = self.status.subscribe();
		match status.wait_for(|status| status.is_ended()).await {
			Ok(status) => *status,
			Err(_) => RecorderStatus::Stopped,
		}
	}

	fn recording(&self) -> Option<Arc<Recording>> {
		self.attachment.lock().as_ref().map(|attachment| Arc::clone(&attachment.recording))
	}

	pub fn pending_requests(&self) -> usize {
		self.recording().map_or(0, |recording| recording.tracker.pending_count())
	}

	pub fn current_page(&self) -> Option<PageInfo> {
		self.recording().map(|recording| recording.pages.current())
	}

	/// Top-level history entries seen by the current recording.
	pub fn history_len(&self) -> usize {
		self.recording().map_or(0, |recording| recording.pages.history_len())
	}

	pub fn session(&self, session_id: &SessionId) -> Option<SessionInfo> {
		self.recording()?.sessions.lock().get(session_id).cloned()
	}

	/// Marks a partial-content refetch as done so the URL can be signalled again.
	pub fn acknowledge_refetch(&self, url: &str) -> bool {
		self.recording().is_some_and(|recording| recording.tracker.acknowledge_refetch(url))
	}

	/// Attaches to the target and starts recording.
	///
	/// A no-op when already running. Session bootstrap failures are logged
	/// and do not fail the attach.
	pub async fn attach(self: &Arc<Self>) -> Result<()> {
		if self.running.swap(true, Ordering::SeqCst) {
			warn!(target = "wr.recorder", target_id = %self.target, "already attached");
			return Ok(());
		}

		let connection = match self.debuggee.attach().await {
			Ok(connection) => connection,
			Err(e) => {
				self.running.store(false, Ordering::SeqCst);
				return Err(e);
			}
		};

		let router = Arc::new(SessionRouter::new(Arc::clone(&connection)).with_timeout(self.config.command_timeout()));
		let recording = Arc::new(Recording::new(router, &self.config, &self.collaborators, Arc::clone(&self.rewriter), self.archive_size.clone(), Arc::clone(&self.size)));
		self.size.store(0, Ordering::Relaxed);

		let events = connection.subscribe();
		let event_loop = tokio::spawn(Arc::clone(self).run_events(Arc::clone(&recording), events));
		let size_timer = tokio::spawn(Arc::clone(&recording).report_size_periodically(self.config.size_report_interval()));
		let attachment = Attachment {
			connection,
			recording: Arc::clone(&recording),
			event_loop,
			size_timer,
		};

		// `stop()` clears `running` before it takes the slot.
		let abandoned = {
			let mut slot = self.attachment.lock();
			if self.running.load(Ordering::SeqCst) {
				*slot = Some(attachment);
				self.status.send_replace(RecorderStatus::Running);
				None
			} else {
				Some(attachment)
			}
		};
		if let Some(attachment) = abandoned {
			info!(target = "wr.recorder", target_id = %self.target, "stopped while attaching");
			attachment.size_timer.abort();
			if let Err(e) = self.debuggee.detach(&attachment.connection).await {
				warn!(target = "wr.recorder", target_id = %self.target, error = %e, "detach failed");
			}
			self.teardown(attachment);
			self.status.send_replace(RecorderStatus::Stopped);
			return Ok(());
		}
		info!(target = "wr.recorder", target_id = %self.target, "recorder attached");

		let root = SessionChain::root();
		recording.session_init(&root).await;
		if self.config.reload_on_attach {
			let reload = Evaluate {
				expression: "window.location.reload()".to_string(),
			};
			if let Err(e) = recording.router.send(&reload, &root).await {
				warn!(target = "wr.recorder", target_id = %self.target, error = %e, "reload after attach failed");
			}
		}
		Ok(())
	}

	/// Commits the final page, detaches, and tears the recording down.
	/// Stopping a recorder that is not running does nothing.
	pub async fn stop(&self) {
		if !self.running.swap(false, Ordering::SeqCst) {
			return;
		}
		let Some(attachment) = self.attachment.lock().take() else {
			return;
		};
		attachment.size_timer.abort();

		let recording = &attachment.recording;
		let dom = recording.pages.dom_snapshot().await;
		recording.release().await;
		if let Err(e) = self.debuggee.detach(&attachment.connection).await {
			warn!(target = "wr.recorder", target_id = %self.target, error = %e, "detach failed");
		}
		recording.pages.finalize(dom).await;

		self.teardown(attachment);
		self.status.send_replace(RecorderStatus::Stopped);
		info!(target = "wr.recorder", target_id = %self.target, size = self.size(), "recorder stopped");
	}

	/// Ends the recording after the target went away. Nothing is sent to it.
	pub async fn target_closed(&self, reason: &str) {
		if !self.running.swap(false, Ordering::SeqCst) {
			return;
		}
		let Some(attachment) = self.attachment.lock().take() else {
			return;
		};
		attachment.size_timer.abort();
		attachment.recording.router.reject_all();
		attachment.recording.pages.finalize(None).await;

		self.teardown(attachment);
		self.status.send_replace(RecorderStatus::TargetClosed);
		info!(target = "wr.recorder", target_id = %self.target, reason, "target closed");
	}

	fn teardown(&self, attachment: Attachment) {
		attachment.connection.unsubscribe();
		attachment.recording.tracker.clear();
		attachment.recording.sessions.lock().clear();
		attachment.event_loop.abort();
	}

	async fn run_events(self: Arc<Self>, recording: Arc<Recording>, mut events: mpsc::UnboundedReceiver<RpcEvent>) {
		while let Some(RpcEvent { method, params }) = events.recv().await {
			if method == TARGET_CRASHED {
				self.target_closed("target crashed").await;
				return;
			}
			match Event::parse(&method, params) {
				Ok(Event::InspectorDetached(detached)) => {
					self.target_closed(&detached.reason).await;
					return;
				}
				Ok(event) => recording.dispatch(event, SessionChain::root()),
				Err(e) => warn!(target = "wr.recorder", %method, error = %e, "malformed event"),
			}
		}
		self.target_closed("connection closed").await;
	}
}

/// State of one attachment, shared by the event loop and handler tasks.
struct Recording {
	router: Arc<SessionRouter>,
	tracker: RequestTracker,
	pages: PageLifecycle,
	sessions: Mutex<HashMap<SessionId, SessionInfo>>,
	rewriter: Arc<ResponseRewriter>,
	signals: Arc<dyn PageSignals>,
	intercept_responses: bool,
	device_pixel_ratio_script: String,
	archive_size: ArchiveSize,
	size: Arc<AtomicU64>,
}

impl Recording {
	fn new(router: Arc<SessionRouter>, config: &RecorderConfig, collaborators: &Collaborators, rewriter: Arc<ResponseRewriter>, archive_size: ArchiveSize, size: Arc<AtomicU64>) -> Self {
		Self {
			tracker: RequestTracker::new(Arc::clone(&router), collaborators, config.partial_refetch_delay()),
			pages: PageLifecycle::new(Arc::clone(&router), collaborators.clone(), config.instrumentation_script_url.clone()),
			router,
			sessions: Mutex::new(HashMap::new()),
			rewriter,
			signals: Arc::clone(&collaborators.signals),
			intercept_responses: config.intercept_responses,
			device_pixel_ratio_script: config.device_pixel_ratio_script.clone(),
			archive_size,
			size,
		}
	}

	/// Turns off what bootstrap turned on at the root and lets go of direct
	/// sub-targets. Paused requests are released by `Fetch.disable`.
	async fn release(&self) {
		let root = SessionChain::root();
		let children: Vec<SessionId> = self.sessions.lock().iter().filter(|(_, info)| info.chain.depth() == 1).map(|(id, _)| id.clone()).collect();
		for session_id in children {
			if let Err(e) = self.router.send(&DetachFromTarget { session_id: session_id.clone() }, &root).await {
				debug!(target = "wr.recorder", %session_id, error = %e, "failed to detach sub-target");
			}
		}
		self.pages.disarm_unload_breakpoint().await;
		if self.intercept_responses {
			if let Err(e) = self.router.send(&FetchDisable {}, &root).await {
				debug!(target = "wr.recorder", error = %e, "failed to disable interception");
			}
		}
		if let Err(e) = self.router.send(&NetworkDisable {}, &root).await {
			debug!(target = "wr.recorder", error = %e, "failed to disable network");
		}
	}

	/// Runs the synchronous part of `event` and spawns the rest.
	fn dispatch(self: &Arc<Self>, event: Event, chain: SessionChain) {
		trace!(target = "wr.recorder", method = event.method(), %chain, "event");
		match event {
			Event::AttachedToTarget(attached) => {
				let child = chain.child(attached.session_id.clone());
				let info = SessionInfo {
					target_type: attached.target_info.target_type,
					url: attached.target_info.url,
					chain: child.clone(),
				};
				debug!(target = "wr.recorder", session_id = %attached.session_id, target_type = %info.target_type, url = %info.url, "sub-target attached");
				self.sessions.lock().insert(attached.session_id, info);

				let this = Arc::clone(self);
				tokio::spawn(async move {
					this.session_init(&child).await;
					if let Err(e) = this.router.send(&RunIfWaitingForDebugger {}, &child).await {
						warn!(target = "wr.recorder", chain = %child, error = %e, "failed to resume sub-target");
					}
				});
			}
			Event::DetachedFromTarget(detached) => {
				debug!(target = "wr.recorder", session_id = %detached.session_id, "sub-target detached");
				self.sessions.lock().remove(&detached.session_id);
			}
			Event::ReceivedMessageFromTarget(received) => {
				if !self.sessions.lock().contains_key(&received.session_id) {
					warn!(target = "wr.recorder", session_id = %received.session_id, "no such session");
					return;
				}
				let child = chain.child(received.session_id);
				match self.router.receive_from_target(&received.message) {
					Ok(Unwrapped::Reply { .. }) => {}
					Ok(Unwrapped::Event { method, params }) => match Event::parse(&method, params) {
						Ok(event) => self.dispatch(event, child),
						Err(e) => warn!(target = "wr.recorder", %method, chain = %child, error = %e, "malformed nested event"),
					},
					Err(e) => warn!(target = "wr.recorder", chain = %child, error = %e, "malformed nested message"),
				}
			}
			Event::RequestWillBeSent(sent) => {
				if let Some(hop) = self.tracker.record_request_sent(&sent) {
					let this = Arc::clone(self);
					tokio::spawn(async move { this.complete(hop, chain).await });
				}
			}
			Event::ResponseReceived(received) => self.tracker.record_response_received(&received),
			Event::ResponseReceivedExtraInfo(extra) => self.tracker.record_extra_info(&extra),
			Event::LoadingFinished(finished) => {
				if let Some(record) = self.tracker.take(&finished.request_id) {
					let this = Arc::clone(self);
					tokio::spawn(async move { this.complete(record, chain).await });
				}
			}
			Event::LoadingFailed(failed) => {
				self.tracker.record_loading_failed(&failed);
			}
			Event::RequestPaused(paused) => {
				let snapshot = if paused.is_response_stage() { self.tracker.record_intercepted_pause(&paused) } else { None };
				let this = Arc::clone(self);
				tokio::spawn(async move { this.resolve_interception(paused, snapshot, chain).await });
			}
			Event::FrameNavigated(navigated) => {
				if self.pages.frame_navigated(&navigated) {
					self.tracker.reset_refetches();
				}
			}
			Event::LoadEventFired(_) => {
				let this = Arc::clone(self);
				tokio::spawn(async move {
					this.pages.load_event().await;
					this.report_size();
				});
			}
			Event::NavigatedWithinDocument(_) => {
				let this = Arc::clone(self);
				tokio::spawn(async move {
					this.pages.navigated_within_document(&chain).await;
				});
			}
			Event::DebuggerPaused(paused) => {
				let this = Arc::clone(self);
				tokio::spawn(async move { this.pages.debugger_paused(&paused).await });
			}
			Event::InspectorDetached(_) => debug!(target = "wr.recorder", %chain, "nested inspector detached"),
			Event::Other { .. } => {}
		}
	}

	/// Bootstraps a session. Failures are logged, never returned.
	async fn session_init(&self, chain: &SessionChain) {
		if let Err(e) = self.try_session_init(chain).await {
			warn!(target = "wr.recorder", %chain, error = %e, "session init failed");
		}
	}

	async fn try_session_init(&self, chain: &SessionChain) -> wr_runtime::Result<()> {
		self.router.send(&SetAutoAttach::nested_paused(), chain).await?;

		if self.intercept_responses {
			if let Err(e) = self.router.send(&FetchEnable::all_responses(), chain).await {
				warn!(target = "wr.recorder", %chain, error = %e, "interception unavailable");
			}
		}

		self.router.send(&NetworkEnable {}, chain).await?;

		if chain.is_root() {
			self.router.send(&PageEnable {}, chain).await?;
			let script = AddScriptToEvaluateOnNewDocument {
				source: self.device_pixel_ratio_script.clone(),
			};
			self.router.send(&script, chain).await?;
		}

		self.router.send(&SetCacheDisabled { cache_disabled: true }, chain).await?;
		debug!(target = "wr.recorder", %chain, "session initialized");
		Ok(())
	}

	async fn complete(&self, record: PendingRequest, chain: SessionChain) {
		let page = self.pages.current();
		let outcome = self.tracker.complete(record, &chain, &page).await;
		if outcome.bytes > 0 {
			self.pages.add_size(outcome.bytes);
			self.size.fetch_add(outcome.bytes, Ordering::Relaxed);
			self.archive_size.add(outcome.bytes);
		}
	}

	/// Resolves a paused request with exactly one of fulfill or continue.
	///
	/// The rewrite runs in its own task so that a panic in it still ends in
	/// a continue.
	async fn resolve_interception(self: Arc<Self>, paused: RequestPaused, snapshot: Option<PendingRequest>, chain: SessionChain) {
		let fulfilled = match snapshot {
			Some(record) => {
				let this = Arc::clone(&self);
				let (held, route) = (paused.clone(), chain.clone());
				match tokio::spawn(async move { this.fulfill_rewritten(&held, record, &route).await }).await {
					Ok(fulfilled) => fulfilled,
					Err(e) => {
						warn!(target = "wr.recorder", url = %paused.request.url, error = %e, "rewrite task failed");
						false
					}
				}
			}
			None => false,
		};
		if fulfilled {
			return;
		}

		let command = ContinueRequest {
			request_id: paused.request_id.clone(),
		};
		if let Err(e) = self.router.send(&command, &chain).await {
			warn!(target = "wr.recorder", url = %paused.request.url, error = %e, "continue failed");
		}
	}

	/// Reads the paused body and, when the rewriter changes it, fulfills the
	/// request with the new body. `false` means the caller must continue.
	async fn fulfill_rewritten(&self, paused: &RequestPaused, mut record: PendingRequest, chain: &SessionChain) -> bool {
		self.tracker.fetch_payload(&mut record, chain, BodySource::Interception(paused.request_id.clone())).await;
		self.tracker.store_fetched(&record);

		let Some(payload) = record.payload.as_deref() else {
			return false;
		};
		let headers = paused.response_headers.clone().unwrap_or_default();
		let Some(body) = self.rewriter.rewrite(content_type(&headers), payload, &paused.request.url) else {
			return false;
		};

		let status = paused.response_status_code.unwrap_or(200);
		let fulfill = FulfillRequest::new(paused.request_id.clone(), status, headers, &body);
		match self.router.send(&fulfill, chain).await {
			Ok(_) => true,
			Err(e) => {
				warn!(target = "wr.recorder", url = %paused.request.url, error = %e, "fulfill failed");
				false
			}
		}
	}

	fn report_size(&self) {
		let bytes = self.size.load(Ordering::Relaxed);
		self.signals.report_size(bytes, &format_bytes(bytes));
	}

	async fn report_size_periodically(self: Arc<Self>, interval: std::time::Duration) {
		let mut ticker = tokio::time::interval(interval);
		ticker.tick().await;
		loop {
			ticker.tick().await;
			self.report_size();
		}
	}
}
