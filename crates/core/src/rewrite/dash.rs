use std::sync::LazyLock;

use regex::Regex;

use super::Limits;

static ADAPTATION_SET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<AdaptationSet\b([^>]*)>(.*?)</AdaptationSet>").expect("ADAPTATION_SET regex should compile"));
static REPRESENTATION: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?s)[ \t]*<Representation\b([^>]*?)(?:/>|>.*?</Representation>)[ \t]*(?:\r?\n)?").expect("REPRESENTATION regex should compile"));
static BANDWIDTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\bbandwidth="(\d+)""#).expect("BANDWIDTH regex should compile"));
static WIDTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\bwidth="(\d+)""#).expect("WIDTH regex should compile"));
static HEIGHT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\bheight="(\d+)""#).expect("HEIGHT regex should compile"));
static AUDIO: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\b(?:contentType="audio"|mimeType="audio/)"#).expect("AUDIO regex should compile"));

/// A numeric attribute, 0 when absent. Values too large for `u64` count as `u64::MAX`.
fn attribute(regex: &Regex, attributes: &str) -> u64 {
	regex.captures(attributes).map_or(0, |c| c[1].parse().unwrap_or(u64::MAX))
}

struct Representation<'a> {
	text: &'a str,
	bandwidth: u64,
	resolution: u64,
	audio: bool,
}

/// Reduces every `<AdaptationSet>` of a DASH manifest to one `<Representation>`.
///
/// Video keeps the highest bandwidth within the resolution and bandwidth
/// limits, audio the highest within the audio limit; either falls back to
/// the lowest bandwidth. Sets with a single representation are kept as
/// they are. Returns `None` only when `text` is not an MPD.
pub fn rewrite_dash(text: &str, limits: &Limits) -> Option<String> {
	if !text.contains("<MPD") {
		return None;
	}
	let out = ADAPTATION_SET.replace_all(text, |caps: &regex::Captures<'_>| {
		let whole = &caps[0];
		let set_audio = AUDIO.is_match(&caps[1]);
		let representations: Vec<Representation<'_>> = REPRESENTATION
			.captures_iter(&caps[2])
			.filter_map(|rep| {
				let attributes = rep.get(1)?.as_str();
				Some(Representation {
					text: rep.get(0)?.as_str(),
					bandwidth: attribute(&BANDWIDTH, attributes),
					resolution: attribute(&WIDTH, attributes).saturating_mul(attribute(&HEIGHT, attributes)),
					audio: set_audio || AUDIO.is_match(attributes),
				})
			})
			.collect();

		if representations.len() < 2 {
			return whole.to_string();
		}

		let within = |r: &&Representation<'_>| {
			if r.audio {
				r.bandwidth <= limits.max_audio_bandwidth
			} else {
				r.bandwidth <= limits.max_bandwidth && r.resolution <= limits.max_resolution
			}
		};
		let Some(best) = representations
			.iter()
			.filter(within)
			.max_by_key(|r| r.bandwidth)
			.or_else(|| representations.iter().min_by_key(|r| r.bandwidth))
			.map(|r| r.text)
		else {
			return whole.to_string();
		};

		let mut kept_one = false;
		REPRESENTATION
			.replace_all(whole, |rep: &regex::Captures<'_>| {
				if !kept_one && &rep[0] == best {
					kept_one = true;
					rep[0].to_string()
				} else {
					String::new()
				}
			})
			.into_owned()
	});

	Some(out.into_owned())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::RewriteConfig;

	const MPD: &str = r#"<?xml version="1.0"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011">
  <Period>
    <AdaptationSet mimeType="video/mp4">
      <Representation id="v1" bandwidth="300000" width="426" height="240"/>
      <Representation id="v2" bandwidth="1200000" width="640" height="360"/>
      <Representation id="v3" bandwidth="5000000" width="1920" height="1080"/>
    </AdaptationSet>
    <AdaptationSet mimeType="audio/mp4">
      <Representation id="a1" bandwidth="64000"><BaseURL>a1.mp4</BaseURL></Representation>
      <Representation id="a2" bandwidth="128000"><BaseURL>a2.mp4</BaseURL></Representation>
      <Representation id="a3" bandwidth="256000"><BaseURL>a3.mp4</BaseURL></Representation>
    </AdaptationSet>
  </Period>
</MPD>
"#;

	fn limits() -> Limits {
		Limits::from(&RewriteConfig::default())
	}

	#[test]
	fn keeps_one_representation_per_set() {
		let out = rewrite_dash(MPD, &limits()).unwrap();
		assert!(out.contains(r#"id="v2""#));
		assert!(!out.contains(r#"id="v1""#));
		assert!(!out.contains(r#"id="v3""#));
		assert!(out.contains(r#"id="a2""#));
		assert!(!out.contains(r#"id="a1""#));
		assert!(!out.contains(r#"id="a3""#));
		assert!(out.contains("<Period>"));
		assert_eq!(out.matches("<AdaptationSet").count(), 2);
	}

	#[test]
	fn falls_back_to_lowest_bandwidth() {
		let limits = Limits {
			max_resolution: 1,
			max_bandwidth: 1,
			max_audio_bandwidth: 1,
		};
		let out = rewrite_dash(MPD, &limits).unwrap();
		assert!(out.contains(r#"id="v1""#));
		assert!(out.contains(r#"id="a1""#));
		assert_eq!(out.matches("<Representation").count(), 2);
	}

	#[test]
	fn single_representation_sets_are_unchanged() {
		let mpd = r#"<MPD><Period><AdaptationSet mimeType="video/mp4"><Representation id="only" bandwidth="1"/></AdaptationSet></Period></MPD>"#;
		assert_eq!(rewrite_dash(mpd, &limits()).as_deref(), Some(mpd));
		assert_eq!(rewrite_dash("<html></html>", &limits()), None);
	}

	#[test]
	fn oversized_dimensions_count_as_over_the_limit() {
		let mpd = r#"<MPD><Period><AdaptationSet mimeType="video/mp4">
<Representation id="huge" bandwidth="1" width="4294967296" height="4294967296"/>
<Representation id="fits" bandwidth="500000" width="640" height="360"/>
</AdaptationSet></Period></MPD>"#;
		let out = rewrite_dash(mpd, &limits()).unwrap();
		assert!(out.contains(r#"id="fits""#));
		assert!(!out.contains(r#"id="huge""#));
	}
}
