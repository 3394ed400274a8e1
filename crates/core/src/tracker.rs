//! The pending-request table and the path from `loadingFinished` to the writer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};
use wr_protocol::{FetchGetResponseBody, GetRequestPostData, GetResponseBody, InterceptionId, LoadingFailed, RequestId, RequestPaused, RequestWillBeSent, ResponseBody, ResponseReceived, ResponseReceivedExtraInfo};
use wr_runtime::{SessionChain, SessionRouter};

use crate::collaborators::{ArchiveWriter, Collaborators, PageSignals, RefetchRequest};
use crate::page::PageInfo;
use crate::request::PendingRequest;

/// Where a response body is read from.
#[derive(Debug, Clone)]
pub enum BodySource {
	/// `Network.getResponseBody` by request id.
	Network,
	/// `Fetch.getResponseBody` for a paused interception.
	Interception(InterceptionId),
}

/// Result of handing a finished request to the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishOutcome {
	pub committed: bool,
	/// Payload bytes to add to the counters; zero unless committed.
	pub bytes: u64,
}

/// No body is fetched for these statuses.
fn skips_body(status: Option<u16>) -> bool {
	matches!(status, Some(204) | Some(300..=399))
}

pub struct RequestTracker {
	router: Arc<SessionRouter>,
	writer: Arc<dyn ArchiveWriter>,
	signals: Arc<dyn PageSignals>,
	refetch_delay: Duration,
	pending: Mutex<HashMap<RequestId, PendingRequest>>,
	/// URLs signalled for refetch and not yet acknowledged.
	refetching: Mutex<HashSet<String>>,
}

impl RequestTracker {
	pub fn new(router: Arc<SessionRouter>, collaborators: &Collaborators, refetch_delay: Duration) -> Self {
		Self {
			router,
			writer: Arc::clone(&collaborators.writer),
			signals: Arc::clone(&collaborators.signals),
			refetch_delay,
			pending: Mutex::new(HashMap::new()),
			refetching: Mutex::new(HashSet::new()),
		}
	}

	pub fn pending_count(&self) -> usize {
		self.pending.lock().len()
	}

	pub fn contains(&self, request_id: &RequestId) -> bool {
		self.pending.lock().contains_key(request_id)
	}

	/// Snapshot of a pending request.
	pub fn get(&self, request_id: &RequestId) -> Option<PendingRequest> {
		self.pending.lock().get(request_id).cloned()
	}

	/// Records `Network.requestWillBeSent`.
	///
	/// When it carries a redirect response for a pending id, the previous hop
	/// is removed, completed with the redirect response, and returned so the
	/// caller can finish it as its own record.
	pub fn record_request_sent(&self, params: &RequestWillBeSent) -> Option<PendingRequest> {
		let mut pending = self.pending.lock();
		let previous = params.redirect_response.as_ref().and_then(|redirect| {
			pending.remove(&params.request_id).map(|mut hop| {
				hop.fill_response(redirect);
				hop
			})
		});

		pending
			.entry(params.request_id.clone())
			.or_insert_with(|| PendingRequest::new(params.request_id.clone()))
			.fill_request(params);
		previous
	}

	pub fn record_response_received(&self, params: &ResponseReceived) {
		let mut pending = self.pending.lock();
		let record = pending.entry(params.request_id.clone()).or_insert_with(|| PendingRequest::new(params.request_id.clone()));
		record.fill_response(&params.response);
		if record.resource_type.is_none() {
			record.resource_type = params.resource_type.clone();
		}
	}

	pub fn record_extra_info(&self, params: &ResponseReceivedExtraInfo) {
		self.pending
			.lock()
			.entry(params.request_id.clone())
			.or_insert_with(|| PendingRequest::new(params.request_id.clone()))
			.fill_extra_info(params);
	}

	/// Records a response-stage `Fetch.requestPaused` against its network id
	/// and returns a snapshot for the interception flow.
	pub fn record_intercepted_pause(&self, params: &RequestPaused) -> Option<PendingRequest> {
		let Some(network_id) = params.network_id.clone() else {
			debug!(target = "wr.tracker", interception_id = %params.request_id, "paused request without network id");
			return None;
		};

		let mut pending = self.pending.lock();
		let record = pending.entry(network_id.clone()).or_insert_with(|| PendingRequest::new(network_id));
		record.fill_paused(params);
		Some(record.clone())
	}

	/// Stores what the interception flow fetched back into the table.
	pub fn store_fetched(&self, fetched: &PendingRequest) {
		if let Some(record) = self.pending.lock().get_mut(&fetched.request_id) {
			record.payload = fetched.payload.clone();
			if record.post_data.is_none() {
				record.post_data = fetched.post_data.clone();
			}
		}
	}

	/// Drops a failed request. Nothing reaches the writer.
	pub fn record_loading_failed(&self, params: &LoadingFailed) -> Option<PendingRequest> {
		let removed = self.take(&params.request_id);
		if removed.is_some() {
			debug!(target = "wr.tracker", request_id = %params.request_id, error = %params.error_text, "loading failed");
		}
		removed
	}

	/// Removes a pending request. Each id is handed out at most once.
	pub fn take(&self, request_id: &RequestId) -> Option<PendingRequest> {
		self.pending.lock().remove(request_id)
	}

	/// Removes `request_id` and completes it. `None` when it was not pending.
	pub async fn finish(&self, request_id: &RequestId, chain: &SessionChain, page: &PageInfo) -> Option<FinishOutcome> {
		let record = self.take(request_id)?;
		Some(self.complete(record, chain, page).await)
	}

	/// Fetches the body if interception did not, and hands the record to the writer.
	pub async fn complete(&self, mut record: PendingRequest, chain: &SessionChain, page: &PageInfo) -> FinishOutcome {
		record.completed_at = Some(Utc::now());
		if !record.fetched {
			self.fetch_payload(&mut record, chain, BodySource::Network).await;
		}

		let committed = self.writer.process_request_response(&record, record.payload.as_deref(), page).await;
		let bytes = if committed { record.payload_len() as u64 } else { 0 };
		debug!(
			target = "wr.tracker",
			request_id = %record.request_id,
			url = %record.url(),
			status = ?record.status(),
			committed,
			bytes,
			"request finished"
		);
		FinishOutcome { committed, bytes }
	}

	/// Reads the response body (and, once, the request body) into `record`.
	///
	/// Non-HTTP(S) URLs capture nothing. A 206 captures nothing on this pass
	/// and instead asks the page to request the resource again. 204 and 3xx
	/// responses have no body to read. Failures leave the payload empty.
	pub async fn fetch_payload(&self, record: &mut PendingRequest, chain: &SessionChain, source: BodySource) {
		record.payload = None;
		if !record.is_http() {
			return;
		}

		if record.status() == Some(206) {
			self.schedule_refetch(record);
			return;
		}

		if !skips_body(record.status()) {
			let body = match &source {
				BodySource::Network => {
					let command = GetResponseBody {
						request_id: record.request_id.clone(),
					};
					self.router.send(&command, chain).await
				}
				BodySource::Interception(interception_id) => {
					let command = FetchGetResponseBody {
						request_id: interception_id.clone(),
					};
					self.router.send(&command, chain).await
				}
			};

			match body.map(ResponseBody::into_bytes) {
				Ok(Ok(bytes)) => record.payload = Some(bytes),
				Ok(Err(e)) => {
					warn!(target = "wr.tracker", url = %record.url(), error = %e, "undecodable response body");
					return;
				}
				Err(e) => {
					warn!(target = "wr.tracker", url = %record.url(), status = ?record.status(), request_id = %record.request_id, error = %e, "no body");
					return;
				}
			}
		}

		if record.has_post_data && record.post_data.is_none() {
			let command = GetRequestPostData {
				request_id: record.request_id.clone(),
			};
			match self.router.send(&command, chain).await {
				Ok(post) => record.post_data = Some(post.post_data.into_bytes()),
				Err(e) => warn!(target = "wr.tracker", url = %record.url(), error = %e, "failed to read POST data"),
			}
		}
	}

	fn schedule_refetch(&self, record: &PendingRequest) {
		let url = record.request_url().to_string();
		if !self.refetching.lock().insert(url.clone()) {
			debug!(target = "wr.tracker", url = %url, "refetch already requested");
			return;
		}

		let request = RefetchRequest {
			url,
			method: record.method().to_string(),
			headers: record.request_headers(),
		};
		let signals = Arc::clone(&self.signals);
		let delay = self.refetch_delay;
		debug!(target = "wr.tracker", url = %request.url, "partial response, refetch scheduled");
		tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			signals.request_refetch(request);
		});
	}

	/// Marks a refetch as done so the URL may be signalled again.
	pub fn acknowledge_refetch(&self, url: &str) -> bool {
		self.refetching.lock().remove(url)
	}

	pub fn reset_refetches(&self) {
		self.refetching.lock().clear();
	}

	pub fn clear(&self) {
		self.pending.lock().clear();
		self.refetching.lock().clear();
	}
}
