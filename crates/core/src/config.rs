//! Recorder configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! yields a working configuration. Keys are camelCase on disk.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RecorderError, Result};

/// Injected on every new top-level document so screenshots and layout are stable.
pub const DEFAULT_DEVICE_PIXEL_RATIO_SCRIPT: &str = "window.devicePixelRatio = 1;";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
	pub size_report_interval_ms: u64,
	/// Delay before asking the page to re-request a 206 resource.
	pub partial_refetch_delay_ms: u64,
	pub command_timeout_ms: u64,
	/// Enable response interception (and rewriting) when the target supports it.
	pub intercept_responses: bool,
	/// Reload the page after attaching so the first navigation is captured.
	pub reload_on_attach: bool,
	pub device_pixel_ratio_script: String,
	/// URL prefix of the injected script whose `beforeunload` listener marks
	/// our unload pause. Empty means any `beforeunload` pause counts.
	pub instrumentation_script_url: String,
	pub rewrite: RewriteConfig,
}

impl Default for RecorderConfig {
	fn default() -> Self {
		Self {
			size_report_interval_ms: 3000,
			partial_refetch_delay_ms: 500,
			command_timeout_ms: 30_000,
			intercept_responses: true,
			reload_on_attach: true,
			device_pixel_ratio_script: DEFAULT_DEVICE_PIXEL_RATIO_SCRIPT.to_string(),
			instrumentation_script_url: String::new(),
			rewrite: RewriteConfig::default(),
		}
	}
}

impl RecorderConfig {
	pub fn from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)?;
		Self::from_json(&content).map_err(|e| match e {
			RecorderError::Serde(e) => RecorderError::Config(format!("{}: {}", path.display(), e)),
			other => other,
		})
	}

	pub fn from_json(content: &str) -> Result<Self> {
		let config: Self = serde_json::from_str(content)?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<()> {
		if self.size_report_interval_ms == 0 {
			return Err(RecorderError::Config("sizeReportIntervalMs must be greater than zero".to_string()));
		}
		if self.command_timeout_ms == 0 {
			return Err(RecorderError::Config("commandTimeoutMs must be greater than zero".to_string()));
		}
		for rule in &self.rewrite.html_rules {
			if rule.contains.is_empty() {
				return Err(RecorderError::Config("htmlRules entries need at least one `contains` pattern".to_string()));
			}
		}
		Ok(())
	}

	pub fn size_report_interval(&self) -> Duration {
		Duration::from_millis(self.size_report_interval_ms)
	}

	pub fn partial_refetch_delay(&self) -> Duration {
		Duration::from_millis(self.partial_refetch_delay_ms)
	}

	pub fn command_timeout(&self) -> Duration {
		Duration::from_millis(self.command_timeout_ms)
	}
}

/// Limits and extra rules for response rewriting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RewriteConfig {
	/// Largest video rendition kept, in pixels (width × height).
	pub max_resolution: u64,
	/// Largest video bandwidth kept, in bits per second.
	pub max_bandwidth: u64,
	pub max_audio_bandwidth: u64,
	/// Rules added in front of the built-in HTML rules.
	pub html_rules: Vec<HtmlRuleConfig>,
}

impl Default for RewriteConfig {
	fn default() -> Self {
		Self {
			max_resolution: 720 * 480,
			max_bandwidth: 2_000_000,
			max_audio_bandwidth: 128_000,
			html_rules: Vec::new(),
		}
	}
}

/// A URL-scoped HTML rule as written in the config file.
///
/// `replacements` pairs a regex with its replacement; `{0}` in the
/// replacement stands for the whole match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlRuleConfig {
	pub contains: Vec<String>,
	#[serde(default)]
	pub replacements: Vec<(String, String)>,
}
