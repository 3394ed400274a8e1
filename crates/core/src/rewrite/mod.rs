//! Rewriting of intercepted response bodies before they reach the page.
//!
//! Streaming manifests are pinned to a single rendition and a few media
//! sites get HTML rewrites that turn off adaptive streaming, so that what the
//! page plays is a file the recorder can capture whole.

mod dash;
mod hls;
mod html;

use tracing::{debug, info};

pub use dash::rewrite_dash;
pub use hls::rewrite_hls;
pub use html::{HtmlRule, RuleSet};

use crate::config::RewriteConfig;
use crate::error::Result;

/// Body kinds the rewriter knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
	Hls,
	Dash,
	Html,
	Other,
}

impl ContentKind {
	/// Classifies a `Content-Type` value. Case and parameters are ignored.
	pub fn from_content_type(content_type: &str) -> Self {
		let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
		match essence.as_str() {
			"application/x-mpegurl" | "application/vnd.apple.mpegurl" | "audio/mpegurl" => Self::Hls,
			"application/dash+xml" => Self::Dash,
			"text/html" => Self::Html,
			_ => Self::Other,
		}
	}
}

/// Rendition limits for manifest rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
	/// Pixels (width × height).
	pub max_resolution: u64,
	pub max_bandwidth: u64,
	pub max_audio_bandwidth: u64,
}

impl From<&RewriteConfig> for Limits {
	fn from(config: &RewriteConfig) -> Self {
		Self {
			max_resolution: config.max_resolution,
			max_bandwidth: config.max_bandwidth,
			max_audio_bandwidth: config.max_audio_bandwidth,
		}
	}
}

/// Pure content-type driven body rewriter.
#[derive(Debug, Clone)]
pub struct ResponseRewriter {
	limits: Limits,
	rules: RuleSet,
}

impl ResponseRewriter {
	pub fn new(config: &RewriteConfig) -> Result<Self> {
		Ok(Self {
			limits: Limits::from(config),
			rules: RuleSet::with_extra(&config.html_rules)?,
		})
	}

	/// Returns the new body, or `None` when the response should pass
	/// through untouched.
	pub fn rewrite(&self, content_type: Option<&str>, body: &[u8], url: &str) -> Option<Vec<u8>> {
		let kind = content_type.map_or(ContentKind::Other, ContentKind::from_content_type);
		if kind == ContentKind::Other || body.is_empty() {
			return None;
		}

		let Ok(text) = std::str::from_utf8(body) else {
			debug!(target = "wr.rewrite", url = %url, "body is not UTF-8");
			return None;
		};

		let rewritten = match kind {
			ContentKind::Hls => rewrite_hls(text, &self.limits),
			ContentKind::Dash => rewrite_dash(text, &self.limits),
			ContentKind::Html => {
				let rule = self.rules.select(url);
				if rule.is_default() { None } else { rule.rewrite(text) }
			}
			ContentKind::Other => None,
		}?;

		info!(target = "wr.rewrite", url = %url, kind = ?kind, "rewritten response");
		Some(rewritten.into_bytes())
	}
}

impl Default for ResponseRewriter {
	fn default() -> Self {
		Self {
			limits: Limits::from(&RewriteConfig::default()),
			rules: RuleSet::builtin(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn content_types_are_normalized() {
		assert_eq!(ContentKind::from_content_type("application/x-mpegURL"), ContentKind::Hls);
		assert_eq!(ContentKind::from_content_type("application/vnd.apple.mpegurl; charset=utf-8"), ContentKind::Hls);
		assert_eq!(ContentKind::from_content_type("application/dash+xml"), ContentKind::Dash);
		assert_eq!(ContentKind::from_content_type("Text/HTML;charset=UTF-8"), ContentKind::Html);
		assert_eq!(ContentKind::from_content_type("image/png"), ContentKind::Other);
	}

	#[test]
	fn other_types_are_never_rewritten() {
		let rewriter = ResponseRewriter::default();
		assert_eq!(rewriter.rewrite(Some("image/png"), b"\x89PNG", "https://www.youtube.com/x.png"), None);
		assert_eq!(rewriter.rewrite(None, b"#EXTM3U", "https://a.example/"), None);
	}

	#[test]
	fn default_html_rule_passes_through() {
		let rewriter = ResponseRewriter::default();
		let body = b"<html><script>ytplayer.load();</script></html>";
		assert_eq!(rewriter.rewrite(Some("text/html"), body, "https://example.com/"), None);
	}

	#[test]
	fn scoped_html_rule_rewrites() {
		let rewriter = ResponseRewriter::default();
		let body = br#"<script>window.data = {"is_dash_eligible":true};</script>"#;
		let rewritten = rewriter.rewrite(Some("text/html; charset=utf-8"), body, "https://www.instagram.com/p/abc/").unwrap();
		assert_eq!(String::from_utf8(rewritten).unwrap(), r#"<script>window.data = {"is_dash_eligible":false};</script>"#);
	}

	#[test]
	fn empty_and_binary_bodies_pass_through() {
		let rewriter = ResponseRewriter::default();
		assert_eq!(rewriter.rewrite(Some("application/x-mpegurl"), b"", "https://a.example/"), None);
		assert_eq!(rewriter.rewrite(Some("text/html"), &[0xff, 0xfe, 0x00], "https://www.facebook.com/"), None);
	}
}
