//! Page snapshots and the navigation-driven lifecycle that produces them.
//!
//! A page starts on a top-level `Page.frameNavigated`, is committed as a
//! non-final snapshot after every load event, and is finalized (committed
//! with `finished = true`) at most once: on our unload breakpoint, or when the
//! recording stops.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wr_protocol::{DebuggerEnable, DebuggerPaused, DebuggerResume, FrameId, FrameNavigated, GetDocument, GetNavigationHistory, RemoveEventListenerBreakpoint, SetEventListenerBreakpoint};
use wr_runtime::{SessionChain, SessionRouter};

use crate::collaborators::Collaborators;

const UNLOAD_EVENT: &str = "beforeunload";

/// A point-in-time description of a recorded page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
	pub id: String,
	pub url: String,
	/// Set once the page has loaded. Pages without a date are never committed.
	pub date: Option<DateTime<Utc>>,
	pub title: String,
	pub text: String,
	pub size: u64,
	pub finished: bool,
}

impl PageInfo {
	/// A fresh page for `url` with a new id.
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			id: Uuid::new_v4().to_string(),
			url: url.into(),
			date: None,
			title: String::new(),
			text: String::new(),
			size: 0,
			finished: false,
		}
	}

	/// Placeholder used before the first navigation. Never committable.
	pub fn blank() -> Self {
		Self {
			id: String::new(),
			url: String::new(),
			date: None,
			title: String::new(),
			text: String::new(),
			size: 0,
			finished: false,
		}
	}

	pub fn is_committable(&self) -> bool {
		!self.url.is_empty() && self.date.is_some()
	}
}

#[derive(Debug, Default)]
struct PageState {
	page: Option<PageInfo>,
	frame_id: Option<FrameId>,
	/// History index to URL for the tracked top-level frame.
	history: HashMap<usize, String>,
	pages_loaded: usize,
	finalized: HashSet<String>,
}

/// Drives [`PageInfo`] through navigation, load, and unload.
pub struct PageLifecycle {
	router: Arc<SessionRouter>,
	collaborators: Collaborators,
	/// Prefix of the injected script's URL; empty matches any unload pause.
	instrumentation_url: String,
	state: Mutex<PageState>,
}

impl PageLifecycle {
	pub fn new(router: Arc<SessionRouter>, collaborators: Collaborators, instrumentation_url: impl Into<String>) -> Self {
		Self {
			router,
			collaborators,
			instrumentation_url: instrumentation_url.into(),
			state: Mutex::new(PageState::default()),
		}
	}

	/// Snapshot of the current page, or a blank one before the first navigation.
	pub fn current(&self) -> PageInfo {
		self.state.lock().page.clone().unwrap_or_else(PageInfo::blank)
	}

	/// Distinct history entries seen for the tracked top-level frame.
	pub fn history_len(&self) -> usize {
		self.state.lock().history.len()
	}

	/// Adds committed bytes to the current page.
	pub fn add_size(&self, bytes: u64) {
		if let Some(page) = self.state.lock().page.as_mut() {
			page.size += bytes;
		}
	}

	/// Starts a new page for a top-level navigation. Returns `false` (and
	/// changes nothing) for sub-frames.
	pub fn frame_navigated(&self, params: &FrameNavigated) -> bool {
		let frame = &params.frame;
		if frame.parent_id.is_some() {
			return false;
		}

		let mut state = self.state.lock();
		if state.frame_id.as_ref() != Some(&frame.id) {
			state.history.clear();
		}
		state.frame_id = Some(frame.id.clone());

		let page = PageInfo::new(frame.url.clone());
		debug!(target = "wr.page", page_id = %page.id, url = %page.url, "new page");
		state.page = Some(page);
		true
	}

	/// Updates the current page after `Page.loadEventFired` and commits a
	/// non-final snapshot. The first load of a recording also arms the
	/// unload breakpoint.
	pub async fn load_event(&self) {
		let root = SessionChain::root();
		match self.router.send(&GetNavigationHistory {}, &root).await {
			Ok(history) => match history.current() {
				Some(entry) => {
					let mut state = self.state.lock();
					state.history.insert(history.current_index, entry.url.clone());
					if let Some(page) = state.page.as_mut() {
						page.url = entry.url.clone();
						page.title = entry.title.clone();
					}
				}
				None => warn!(target = "wr.page", index = history.current_index, "navigation history has no current entry"),
			},
			Err(e) => warn!(target = "wr.page", error = %e, "failed to read navigation history"),
		}
		if let Some(page) = self.state.lock().page.as_mut() {
			if page.title.is_empty() {
				page.title = page.url.clone();
			}
			page.date.get_or_insert_with(Utc::now);
		}

		let dom = self.dom_snapshot().await;
		self.commit(self.current(), dom, false).await;

		let first = {
			let mut state = self.state.lock();
			state.pages_loaded += 1;
			state.pages_loaded == 1
		};
		if first {
			self.arm_unload_breakpoint().await;
		}
	}

	async fn arm_unload_breakpoint(&self) {
		let root = SessionChain::root();
		if let Err(e) = self.router.send(&DebuggerEnable {}, &root).await {
			warn!(target = "wr.page", error = %e, "failed to enable debugger");
			return;
		}
		let breakpoint = SetEventListenerBreakpoint {
			event_name: UNLOAD_EVENT.to_string(),
		};
		if let Err(e) = self.router.send(&breakpoint, &root).await {
			warn!(target = "wr.page", error = %e, "failed to set unload breakpoint");
		}
	}

	/// Removes the unload breakpoint if a load armed it.
	pub async fn disarm_unload_breakpoint(&self) {
		if self.state.lock().pages_loaded == 0 {
			return;
		}
		let breakpoint = RemoveEventListenerBreakpoint {
			event_name: UNLOAD_EVENT.to_string(),
		};
		if let Err(e) = self.router.send(&breakpoint, &SessionChain::root()).await {
			debug!(target = "wr.page", error = %e, "failed to remove unload breakpoint");
		}
	}

	/// Tracks a history-API navigation. Returns `true` when a new top-of-stack
	/// entry was recorded. Sub-session navigations are ignored.
	pub async fn navigated_within_document(&self, chain: &SessionChain) -> bool {
		if !chain.is_root() {
			return false;
		}

		let history = match self.router.send(&GetNavigationHistory {}, chain).await {
			Ok(history) => history,
			Err(e) => {
				warn!(target = "wr.page", error = %e, "failed to read navigation history");
				return false;
			}
		};

		let Some(entry) = history.current() else {
			return false;
		};
		if !history.at_top() {
			return false;
		}

		let mut state = self.state.lock();
		if state.history.get(&history.current_index) == Some(&entry.url) {
			return false;
		}
		debug!(target = "wr.page", index = history.current_index, url = %entry.url, "new history entry");
		state.history.insert(history.current_index, entry.url.clone());
		true
	}

	/// Handles `Debugger.paused`. Our unload pause finalizes the page; any
	/// other pause is just resumed.
	pub async fn debugger_paused(&self, params: &DebuggerPaused) {
		let ours = self.is_unload_pause(params);
		let dom = if ours { self.dom_snapshot().await } else { None };
		let page = self.current();

		if let Err(e) = self.router.send(&DebuggerResume {}, &SessionChain::root()).await {
			warn!(target = "wr.page", error = %e, "failed to resume debugger");
		}

		if ours {
			self.commit(page, dom, true).await;
		}
	}

	fn is_unload_pause(&self, params: &DebuggerPaused) -> bool {
		if !self.instrumentation_url.is_empty() {
			return params.call_frames.first().is_some_and(|frame| frame.url.starts_with(&self.instrumentation_url));
		}
		params
			.data
			.as_ref()
			.and_then(|data| data["eventName"].as_str())
			.is_some_and(|name| name.ends_with(UNLOAD_EVENT))
	}

	/// Full DOM of the current page, or `None` when the page is not
	/// committable or the snapshot fails.
	pub async fn dom_snapshot(&self) -> Option<Value> {
		if !self.current().is_committable() {
			return None;
		}
		match self.router.send(&GetDocument::full(), &SessionChain::root()).await {
			Ok(document) => Some(document.root),
			Err(e) => {
				warn!(target = "wr.page", error = %e, "DOM snapshot failed");
				None
			}
		}
	}

	/// Commits the current page as finished.
	pub async fn finalize(&self, dom: Option<Value>) -> bool {
		self.commit(self.current(), dom, true).await
	}

	/// Hands `page` to the writer and indexer.
	///
	/// No-op (returns `false`) when the page lacks url or date, or was
	/// already finalized.
	pub async fn commit(&self, mut page: PageInfo, dom: Option<Value>, finished: bool) -> bool {
		if !page.is_committable() {
			debug!(target = "wr.page", page_id = %page.id, "page not committable");
			return false;
		}

		match dom {
			Some(root) => page.text = self.collaborators.extractor.extract(&root),
			None => warn!(target = "wr.page", page_id = %page.id, "no text update"),
		}
		page.finished = finished;

		{
			let mut state = self.state.lock();
			if state.finalized.contains(&page.id) || (finished && !state.finalized.insert(page.id.clone())) {
				debug!(target = "wr.page", page_id = %page.id, "page already finalized");
				return false;
			}
			if let Some(current) = state.page.as_mut().filter(|current| current.id == page.id) {
				current.text = page.text.clone();
				current.finished = finished;
				page.size = current.size;
			}
		}

		if let Err(e) = self.collaborators.writer.add_page(&page).await {
			warn!(target = "wr.page", page_id = %page.id, error = %e, "writer rejected page");
		}
		self.collaborators.indexer.add_page_text(&page);
		info!(target = "wr.page", page_id = %page.id, url = %page.url, finished, "page committed");
		true
	}
}
