//! DevTools endpoint discovery over the browser's HTTP interface.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CliError, Result};

/// One entry of `/json/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
	pub id: String,
	#[serde(rename = "type")]
	pub target_type: String,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub title: String,
	/// Missing when another client is already attached to the target.
	#[serde(default)]
	pub web_socket_debugger_url: Option<String>,
}

impl TargetDescriptor {
	pub fn is_page(&self) -> bool {
		self.target_type == "page"
	}
}

/// Fetches `/json/list` from the browser listening on `port`.
///
/// Tries the IPv4 loopback, `localhost`, then the IPv6 loopback.
pub async fn list_targets(port: u16) -> Result<Vec<TargetDescriptor>> {
	let client = reqwest::Client::builder().timeout(Duration::from_millis(800)).build()?;
	let mut last_error = "no response".to_string();

	for url in [
		format!("http://127.0.0.1:{}/json/list", port),
		format!("http://localhost:{}/json/list", port),
		format!("http://[::1]:{}/json/list", port),
	] {
		let response = match client.get(&url).send().await {
			Ok(r) => r,
			Err(e) => {
				last_error = e.to_string();
				continue;
			}
		};

		if !response.status().is_success() {
			last_error = format!("unexpected status {}", response.status());
			continue;
		}

		let targets: Vec<TargetDescriptor> = response.json().await?;
		debug!(target = "wr.cli", %url, count = targets.len(), "targets listed");
		return Ok(targets);
	}

	Err(CliError::Discovery(format!(
		"No browser with remote debugging found on port {}: {}\nStart one with: google-chrome --remote-debugging-port={}",
		port, last_error, port
	)))
}

/// Picks the page to record.
///
/// `wanted` matches a target id exactly, or else any page whose URL contains
/// it. Without `wanted` the first page is chosen.
pub fn select_target<'a>(targets: &'a [TargetDescriptor], wanted: Option<&str>) -> Option<&'a TargetDescriptor> {
	let mut pages = targets.iter().filter(|target| target.is_page());
	match wanted {
		None => pages.next(),
		Some(wanted) => targets
			.iter()
			.find(|target| target.is_page() && target.id == wanted)
			.or_else(|| pages.find(|target| target.url.contains(wanted))),
	}
}
