//! `wr record`: attach to one page target and record it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use recorder::{Collaborators, Debuggee, PageSignals, RecorderConfig, RecordingManager, RefetchRequest, format_bytes};
use serde_json::json;
use tracing::{debug, info, warn};
use wr_protocol::{Evaluate, TargetId};
use wr_runtime::{Connection, WebSocketTransport};

use crate::cli::RecordArgs;
use crate::discovery::{list_targets, select_target};
use crate::error::{CliError, Result};
use crate::manifest::ManifestWriter;

/// A page reached through its own DevTools WebSocket endpoint.
///
/// Also carries the recorder's page signals: refetches are replayed in the
/// page with `fetch`, size reports go to the log.
pub struct PageDebuggee {
	endpoint: String,
	timeout: Duration,
	connection: Mutex<Option<Arc<Connection>>>,
}

impl PageDebuggee {
	pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Arc<Self> {
		Arc::new(Self {
			endpoint: endpoint.into(),
			timeout,
			connection: Mutex::new(None),
		})
	}
}

#[async_trait]
impl Debuggee for PageDebuggee {
	async fn attach(&self) -> recorder::Result<Arc<Connection>> {
		let parts = WebSocketTransport::connect(&self.endpoint).await?;
		let connection = Connection::new(parts).with_timeout(self.timeout).start();
		*self.connection.lock() = Some(Arc::clone(&connection));
		debug!(target = "wr.cli", endpoint = %self.endpoint, "page connected");
		Ok(connection)
	}

	async fn detach(&self, connection: &Connection) -> recorder::Result<()> {
		self.connection.lock().take();
		connection.close().await?;
		debug!(target = "wr.cli", endpoint = %self.endpoint, "page disconnected");
		Ok(())
	}
}

impl PageSignals for PageDebuggee {
	fn request_refetch(&self, request: RefetchRequest) {
		let Some(connection) = self.connection.lock().clone() else {
			debug!(target = "wr.cli", url = %request.url, "refetch after detach dropped");
			return;
		};
		let expression = match refetch_expression(&request) {
			Ok(expression) => expression,
			Err(e) => {
				warn!(target = "wr.cli", url = %request.url, error = %e, "cannot build refetch");
				return;
			}
		};
		tokio::spawn(async move {
			if let Err(e) = connection.send(&Evaluate { expression }).await {
				warn!(target = "wr.cli", url = %request.url, error = %e, "refetch failed");
			}
		});
	}

	fn report_size(&self, bytes: u64, size_display: &str) {
		info!(target = "wr.cli", bytes, size = size_display, "recording size");
	}
}

/// Script that re-requests the whole resource from inside the page.
fn refetch_expression(request: &RefetchRequest) -> serde_json::Result<String> {
	let headers: serde_json::Map<String, serde_json::Value> = request
		.headers
		.iter()
		.filter(|(name, _)| !name.eq_ignore_ascii_case("range"))
		.map(|(name, value)| (name.clone(), json!(value)))
		.collect();
	let init = json!({
		"method": request.method,
		"headers": headers,
		"cache": "no-store",
		"credentials": "include",
	});
	Ok(format!("fetch({}, {}).then(r => r.arrayBuffer()).catch(() => null)", serde_json::to_string(&request.url)?, init))
}

pub async fn execute(args: RecordArgs) -> Result<()> {
	let mut config = match &args.config {
		Some(path) => RecorderConfig::from_file(path)?,
		None => RecorderConfig::default(),
	};
	if args.no_intercept {
		config.intercept_responses = false;
	}

	let targets = list_targets(args.port).await?;
	let target = select_target(&targets, args.target.as_deref()).ok_or_else(|| match &args.target {
		Some(wanted) => CliError::Discovery(format!("No page target matches {:?}", wanted)),
		None => CliError::Discovery("No page targets to record".to_string()),
	})?;
	let endpoint = target
		.web_socket_debugger_url
		.clone()
		.ok_or_else(|| CliError::Discovery(format!("Target {} has no WebSocket endpoint; is another client attached?", target.id)))?;

	let writer = Arc::new(match &args.out {
		Some(path) => ManifestWriter::create(path)?,
		None => ManifestWriter::stdout(),
	});
	let page = PageDebuggee::new(endpoint, config.command_timeout());
	let collaborators = Collaborators::with_writer(writer.clone()).signals(page.clone());
	let manager = RecordingManager::new(config, collaborators);

	let recorder = manager.start(TargetId::new(target.id.clone()), page.clone()).await?;
	info!(target = "wr.cli", target_id = %target.id, url = %target.url, "recording");

	tokio::select! {
		_ = tokio::signal::ctrl_c() => info!(target = "wr.cli", "interrupted"),
		_ = elapsed(args.duration_secs) => info!(target = "wr.cli", "duration elapsed"),
		status = recorder.ended() => info!(target = "wr.cli", ?status, "recording ended"),
	}
	manager.stop_all().await;

	eprintln!(
		"Recorded {} requests and {} page snapshots ({})",
		writer.request_count(),
		writer.page_count(),
		format_bytes(manager.archive_size().get())
	);
	Ok(())
}

async fn elapsed(duration_secs: Option<u64>) {
	match duration_secs {
		Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
		None => std::future::pending().await,
	}
}
