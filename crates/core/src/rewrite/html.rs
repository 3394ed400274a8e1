use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::config::HtmlRuleConfig;
use crate::error::{RecorderError, Result};

/// A URL-scoped list of regex replacements for HTML bodies.
///
/// `{0}` in a replacement stands for the whole match.
#[derive(Debug, Clone)]
pub struct HtmlRule {
	contains: Vec<String>,
	replacements: Vec<(Regex, String)>,
}

impl HtmlRule {
	pub fn new(contains: Vec<String>, replacements: Vec<(Regex, String)>) -> Self {
		Self { contains, replacements }
	}

	fn builtin(contains: &[&str], replacements: &[(&str, &str)]) -> Self {
		Self {
			contains: contains.iter().map(|s| s.to_string()).collect(),
			replacements: replacements
				.iter()
				.map(|(pattern, replacement)| (Regex::new(pattern).expect("built-in rewrite rule should compile"), replacement.to_string()))
				.collect(),
		}
	}

	fn default_rule() -> Self {
		Self {
			contains: Vec::new(),
			replacements: Vec::new(),
		}
	}

	/// The rule that matches no URL and changes nothing.
	pub fn is_default(&self) -> bool {
		self.contains.is_empty()
	}

	pub fn matches(&self, url: &str) -> bool {
		self.contains.iter().any(|needle| url.contains(needle.as_str()))
	}

	/// Applies every replacement in order. `None` when nothing changed.
	pub fn rewrite(&self, text: &str) -> Option<String> {
		let mut out = Cow::Borrowed(text);
		for (pattern, replacement) in &self.replacements {
			let next = match pattern.replace_all(&out, |caps: &Captures<'_>| replacement.replace("{0}", &caps[0])) {
				Cow::Owned(next) => Some(next),
				Cow::Borrowed(_) => None,
			};
			if let Some(next) = next {
				out = Cow::Owned(next);
			}
		}
		match out {
			Cow::Owned(rewritten) if rewritten != text => Some(rewritten),
			_ => None,
		}
	}
}

static BUILTIN_RULES: LazyLock<Vec<HtmlRule>> = LazyLock::new(|| {
	vec![
		HtmlRule::builtin(
			&["youtube.com", "youtube-nocookie.com"],
			&[
				(r"ytplayer\.load\(\);", r#"ytplayer.config.args.dash = "0"; ytplayer.config.args.dashmpd = ""; {0}"#),
				(r#"yt\.setConfig.*PLAYER_CONFIG.*args":\s*\{"#, r#"{0} "dash": "0", dashmpd: "", "#),
				(r#"(?:"player":|ytplayer\.config).*"args":\s*\{"#, r#"{0}"dash":"0","dashmpd":"","#),
				(r#"yt\.setConfig.*PLAYER_VARS":\s*\{"#, r#"{0}"dash":"0","dashmpd":"","#),
				(r"ytplayer\.web_player_context_config = \{", r#"{0}"dash":"0","dashmpd":"","#),
			],
		),
		HtmlRule::builtin(&["player.vimeo.com/video/"], &[(r#""dash":\{"#, r#""__nodash__":{"#)]),
		HtmlRule::builtin(&["facebook.com/"], &[(r#""dash_"#, r#""__nodash__"#), (r#"_dash""#, r#"__nodash__""#), (r"_dash_", "__nodash__")]),
		HtmlRule::builtin(&["instagram.com/"], &[(r#""is_dash_eligible":(?:true|1)"#, r#""is_dash_eligible":false"#)]),
		HtmlRule::builtin(&["twitter.com/"], &[(r#""playbackType":"application/x-mpegURL""#, r#""playbackType":"video/mp4""#)]),
	]
});

/// Ordered HTML rules plus the default (no-op) rule.
#[derive(Debug, Clone)]
pub struct RuleSet {
	rules: Vec<HtmlRule>,
	default: HtmlRule,
}

impl RuleSet {
	pub fn builtin() -> Self {
		Self {
			rules: BUILTIN_RULES.clone(),
			default: HtmlRule::default_rule(),
		}
	}

	/// Built-in rules with `extra` (from config) taking precedence.
	pub fn with_extra(extra: &[HtmlRuleConfig]) -> Result<Self> {
		let mut rules = Vec::with_capacity(extra.len() + BUILTIN_RULES.len());
		for rule in extra {
			let mut replacements = Vec::with_capacity(rule.replacements.len());
			for (pattern, replacement) in &rule.replacements {
				let regex = Regex::new(pattern).map_err(|e| RecorderError::Config(format!("invalid htmlRules pattern {pattern:?}: {e}")))?;
				replacements.push((regex, replacement.clone()));
			}
			rules.push(HtmlRule::new(rule.contains.clone(), replacements));
		}
		rules.extend(BUILTIN_RULES.iter().cloned());
		Ok(Self {
			rules,
			default: HtmlRule::default_rule(),
		})
	}

	/// First rule whose URL pattern matches, else the default rule.
	pub fn select(&self, url: &str) -> &HtmlRule {
		self.rules.iter().find(|rule| rule.matches(url)).unwrap_or(&self.default)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn selects_by_url_substring() {
		let rules = RuleSet::builtin();
		assert!(!rules.select("https://www.youtube.com/watch?v=1").is_default());
		assert!(!rules.select("https://player.vimeo.com/video/123").is_default());
		assert!(rules.select("https://vimeo.com/123").is_default());
		assert!(rules.select("https://example.com/").is_default());
	}

	#[test]
	fn whole_match_placeholder() {
		let rules = RuleSet::builtin();
		let rule = rules.select("https://www.youtube.com/watch?v=1");
		let out = rule.rewrite("<script>ytplayer.load();</script>").unwrap();
		assert_eq!(out, r#"<script>ytplayer.config.args.dash = "0"; ytplayer.config.args.dashmpd = ""; ytplayer.load();</script>"#);
	}

	#[test]
	fn unchanged_text_is_no_rewrite() {
		let rules = RuleSet::builtin();
		assert_eq!(rules.select("https://www.facebook.com/watch").rewrite("<p>nothing here</p>"), None);
	}

	#[test]
	fn configured_rules_come_first() {
		let extra = vec![HtmlRuleConfig {
			contains: vec!["youtube.com/embed".to_string()],
			replacements: vec![("autoplay=1".to_string(), "autoplay=0 <!-- {0} -->".to_string())],
		}];
		let rules = RuleSet::with_extra(&extra).unwrap();
		let out = rules.select("https://www.youtube.com/embed/xyz").rewrite("src=?autoplay=1").unwrap();
		assert_eq!(out, "src=?autoplay=0 <!-- autoplay=1 -->");
	}

	#[test]
	fn invalid_configured_pattern_is_a_config_error() {
		let extra = vec![HtmlRuleConfig {
			contains: vec!["a".to_string()],
			replacements: vec![("(".to_string(), "".to_string())],
		}];
		assert!(matches!(RuleSet::with_extra(&extra), Err(RecorderError::Config(_))));
	}
}
