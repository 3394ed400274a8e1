//! Text extraction from DOM snapshots.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::collaborators::TextExtractor;

static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\r\n\u{a0}]+").expect("MULTI_SPACE regex should compile"));

const TEXT_NODE: u64 = 3;

/// Elements whose text children are not page text.
const SKIPPED_ELEMENTS: &[&str] = &["SCRIPT", "STYLE", "NOSCRIPT", "TEMPLATE", "HEAD"];

/// Collects the text nodes of a `DOM.getDocument` tree.
///
/// Walks children, iframe content documents, and shadow roots. Text inside
/// script-like elements is skipped. Each text node becomes one
/// whitespace-collapsed fragment; fragments are joined with single spaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct DomTextExtractor;

impl TextExtractor for DomTextExtractor {
	fn extract(&self, root: &Value) -> String {
		let mut fragments = Vec::new();
		collect_text(root, false, &mut fragments);
		fragments.join(" ")
	}
}

fn collect_text(node: &Value, skipped: bool, out: &mut Vec<String>) {
	if node["nodeType"].as_u64() == Some(TEXT_NODE) {
		if !skipped {
			if let Some(value) = node["nodeValue"].as_str() {
				let text = MULTI_SPACE.replace_all(value, " ");
				let text = text.trim();
				if !text.is_empty() {
					out.push(text.to_string());
				}
			}
		}
		return;
	}

	let name = node["nodeName"].as_str().unwrap_or_default();
	let skipped = skipped || SKIPPED_ELEMENTS.iter().any(|skip| name.eq_ignore_ascii_case(skip));

	for key in ["children", "shadowRoots"] {
		if let Some(children) = node[key].as_array() {
			for child in children {
				collect_text(child, skipped, out);
			}
		}
	}

	if let Some(document) = node.get("contentDocument") {
		collect_text(document, false, out);
	}
}
