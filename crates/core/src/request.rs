//! Per-request state merged from several event channels.
//!
//! A request is described piecemeal: `requestWillBeSent` and
//! `responseReceived` on the network channel, `responseReceivedExtraInfo`
//! with the raw wire headers, and `Fetch.requestPaused` when the response was
//! intercepted. These can arrive in any order, so each field remembers which
//! [`Source`] set it and only an equal or higher-ranked source may replace it.

use chrono::{DateTime, Utc};
use wr_protocol::{Headers, NetworkResponse, RequestId, RequestPaused, RequestWillBeSent, ResponseReceivedExtraInfo, headers_from_entries};

/// Where a field value came from, lowest priority first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Source {
	#[default]
	Unset,
	ExtraInfo,
	Interception,
	Network,
}

#[derive(Debug, Clone)]
struct Ranked<T> {
	value: Option<T>,
	source: Source,
}

impl<T> Default for Ranked<T> {
	fn default() -> Self {
		Self {
			value: None,
			source: Source::Unset,
		}
	}
}

impl<T> Ranked<T> {
	fn offer(&mut self, value: T, source: Source) {
		if source >= self.source {
			self.value = Some(value);
			self.source = source;
		}
	}

	fn get(&self) -> Option<&T> {
		self.value.as_ref()
	}
}

/// A request observed but not yet finished.
#[derive(Debug, Clone)]
pub struct PendingRequest {
	pub request_id: RequestId,
	url: Ranked<String>,
	response_url: Option<String>,
	method: Ranked<String>,
	request_headers: Ranked<Headers>,
	status: Ranked<u16>,
	status_text: Ranked<String>,
	response_headers: Ranked<Headers>,
	extra_headers: Headers,
	mime_type: Ranked<String>,
	pub protocol: Option<String>,
	pub remote_ip_address: Option<String>,
	pub from_service_worker: bool,
	pub resource_type: Option<String>,
	pub has_post_data: bool,
	/// Request body, fetched lazily and at most once.
	pub post_data: Option<Vec<u8>>,
	/// `true` when the response was captured through interception, in which
	/// case [`payload`](Self::payload) was already fetched.
	pub fetched: bool,
	pub payload: Option<Vec<u8>>,
	pub started_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
}

impl PendingRequest {
	pub fn new(request_id: RequestId) -> Self {
		Self {
			request_id,
			url: Ranked::default(),
			response_url: None,
			method: Ranked::default(),
			request_headers: Ranked::default(),
			status: Ranked::default(),
			status_text: Ranked::default(),
			response_headers: Ranked::default(),
			extra_headers: Headers::new(),
			mime_type: Ranked::default(),
			protocol: None,
			remote_ip_address: None,
			from_service_worker: false,
			resource_type: None,
			has_post_data: false,
			post_data: None,
			fetched: false,
			payload: None,
			started_at: None,
			completed_at: None,
		}
	}

	pub fn fill_request(&mut self, params: &RequestWillBeSent) {
		let request = &params.request;
		self.url.offer(request.url.clone(), Source::Network);
		self.method.offer(request.method.clone(), Source::Network);
		self.request_headers.offer(request.headers.clone(), Source::Network);
		self.has_post_data = self.has_post_data || request.has_post_data.unwrap_or(false) || request.post_data.is_some();
		if self.post_data.is_none() {
			self.post_data = request.post_data.as_ref().map(|body| body.clone().into_bytes());
		}
		if params.resource_type.is_some() {
			self.resource_type = params.resource_type.clone();
		}
		if let Some(wall_time) = params.wall_time {
			self.started_at = DateTime::<Utc>::from_timestamp_millis((wall_time * 1000.0) as i64);
		}
	}

	pub fn fill_response(&mut self, response: &NetworkResponse) {
		self.response_url = Some(response.url.clone());
		self.status.offer(response.status, Source::Network);
		self.status_text.offer(response.status_text.clone(), Source::Network);
		self.response_headers.offer(response.headers.clone(), Source::Network);
		if !response.mime_type.is_empty() {
			self.mime_type.offer(response.mime_type.clone(), Source::Network);
		}
		if response.protocol.is_some() {
			self.protocol = response.protocol.clone();
		}
		if response.remote_ip_address.is_some() {
			self.remote_ip_address = response.remote_ip_address.clone();
		}
		self.from_service_worker = response.from_service_worker.unwrap_or(false);
	}

	/// Merges raw wire headers. Only fills what the network channel left unset.
	pub fn fill_extra_info(&mut self, params: &ResponseReceivedExtraInfo) {
		for (name, value) in &params.headers {
			self.extra_headers.entry(name.clone()).or_insert_with(|| value.clone());
		}
		if let Some(status) = params.status_code {
			self.status.offer(status, Source::ExtraInfo);
		}
	}

	/// Records an interception pause and marks the request as fetch-captured.
	pub fn fill_paused(&mut self, params: &RequestPaused) {
		self.fetched = true;
		self.url.offer(params.request.url.clone(), Source::Interception);
		self.method.offer(params.request.method.clone(), Source::Interception);
		self.request_headers.offer(params.request.headers.clone(), Source::Interception);
		if let Some(status) = params.response_status_code {
			self.status.offer(status, Source::Interception);
		}
		if let Some(text) = &params.response_status_text {
			self.status_text.offer(text.clone(), Source::Interception);
		}
		if let Some(entries) = &params.response_headers {
			self.response_headers.offer(headers_from_entries(entries), Source::Interception);
		}
		if self.resource_type.is_none() {
			self.resource_type = params.resource_type.clone();
		}
	}

	/// Final URL of the response, falling back to the requested URL.
	pub fn url(&self) -> &str {
		self.response_url
			.as_deref()
			.or_else(|| self.url.get().map(String::as_str))
			.unwrap_or_default()
	}

	pub fn request_url(&self) -> &str {
		self.url.get().map(String::as_str).unwrap_or_default()
	}

	pub fn method(&self) -> &str {
		self.method.get().map(String::as_str).unwrap_or("GET")
	}

	pub fn status(&self) -> Option<u16> {
		self.status.get().copied()
	}

	pub fn status_source(&self) -> Source {
		self.status.source
	}

	pub fn status_text(&self) -> &str {
		self.status_text.get().map(String::as_str).unwrap_or_default()
	}

	pub fn mime_type(&self) -> Option<&str> {
		self.mime_type.get().map(String::as_str)
	}

	pub fn request_headers(&self) -> Headers {
		self.request_headers.get().cloned().unwrap_or_default()
	}

	/// Response headers: primary headers, plus extra-info headers whose
	/// names (case-insensitively) the primary set does not already carry.
	pub fn response_headers(&self) -> Headers {
		let mut headers = self.response_headers.get().cloned().unwrap_or_default();
		for (name, value) in &self.extra_headers {
			if !headers.keys().any(|existing| existing.eq_ignore_ascii_case(name)) {
				headers.insert(name.clone(), value.clone());
			}
		}
		headers
	}

	pub fn payload_len(&self) -> usize {
		self.payload.as_ref().map_or(0, Vec::len)
	}

	/// `true` for `http:` and `https:` URLs, the only ones captured.
	pub fn is_http(&self) -> bool {
		let url = self.url();
		url.starts_with("http:") || url.starts_with("https:")
	}
}
