use std::sync::LazyLock;

use regex::Regex;

use super::Limits;

static STREAM_INF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#EXT-X-STREAM-INF:").expect("STREAM_INF regex should compile"));
static BANDWIDTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[:,]BANDWIDTH=(\d+)").expect("BANDWIDTH regex should compile"));
static RESOLUTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"RESOLUTION=(\d+)x(\d+)").expect("RESOLUTION regex should compile"));

struct Variant {
	/// Index of the `#EXT-X-STREAM-INF` line.
	tag: usize,
	/// Index of the URI line, when present.
	uri: Option<usize>,
	bandwidth: u64,
	resolution: u64,
}

/// Reduces an HLS master playlist to a single variant stream.
///
/// Keeps the highest-bandwidth variant within the limits, or the
/// lowest-bandwidth one when none qualifies. Media playlists and
/// single-variant masters come back unchanged. Returns `None` only when
/// `text` is not a playlist.
pub fn rewrite_hls(text: &str, limits: &Limits) -> Option<String> {
	if !text.trim_start().starts_with("#EXTM3U") {
		return None;
	}
	let lines: Vec<&str> = text.trim_end().lines().collect();
	let variants = parse_variants(&lines);
	if variants.len() < 2 {
		return Some(text.to_string());
	}

	let within = |v: &&Variant| v.resolution <= limits.max_resolution && v.bandwidth <= limits.max_bandwidth;
	let best = variants
		.iter()
		.filter(within)
		.max_by_key(|v| (v.bandwidth, v.resolution))
		.or_else(|| variants.iter().min_by_key(|v| (v.bandwidth, v.resolution)))?;

	let dropped: Vec<usize> = variants
		.iter()
		.filter(|v| v.tag != best.tag)
		.flat_map(|v| std::iter::once(v.tag).chain(v.uri))
		.collect();

	let mut out = String::with_capacity(text.len());
	for (index, line) in lines.iter().enumerate() {
		if !dropped.contains(&index) {
			out.push_str(line);
			out.push('\n');
		}
	}
	Some(out)
}

/// A numeric attribute. Digits too large for `u64` count as `u64::MAX`.
fn dimension(digits: &str) -> u64 {
	digits.parse().unwrap_or(u64::MAX)
}

fn parse_variants(lines: &[&str]) -> Vec<Variant> {
	let mut variants = Vec::new();
	for (index, line) in lines.iter().enumerate() {
		if !STREAM_INF.is_match(line) {
			continue;
		}

		let bandwidth = BANDWIDTH.captures(line).map_or(0, |c| dimension(&c[1]));
		let resolution = RESOLUTION
			.captures(line)
			.map_or(0, |c| dimension(&c[1]).saturating_mul(dimension(&c[2])));
		let uri = lines
			.iter()
			.enumerate()
			.skip(index + 1)
			.find(|(_, next)| !next.trim().is_empty())
			.filter(|(_, next)| !next.starts_with('#'))
			.map(|(uri, _)| uri);

		variants.push(Variant {
			tag: index,
			uri,
			bandwidth,
			resolution,
		});
	}
	variants
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::RewriteConfig;

	const MASTER: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=400000,RESOLUTION=426x240
low/index.m3u8
#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=1500000,RESOLUTION=854x480
mid/index.m3u8
#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=4500000,RESOLUTION=1920x1080
high/index.m3u8
";

	fn limits() -> Limits {
		Limits::from(&RewriteConfig::default())
	}

	#[test]
	fn keeps_best_variant_within_limits() {
		let out = rewrite_hls(MASTER, &limits()).unwrap();
		assert_eq!(out, "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=400000,RESOLUTION=426x240\nlow/index.m3u8\n");
	}

	#[test]
	fn larger_limits_pick_a_larger_variant() {
		let limits = Limits {
			max_resolution: 1920 * 1080,
			max_bandwidth: 2_000_000,
			max_audio_bandwidth: 128_000,
		};
		let out = rewrite_hls(MASTER, &limits).unwrap();
		assert!(out.contains("mid/index.m3u8"));
		assert!(!out.contains("low/index.m3u8"));
		assert!(!out.contains("high/index.m3u8"));
	}

	#[test]
	fn falls_back_to_lowest_bandwidth() {
		let limits = Limits {
			max_resolution: 100,
			max_bandwidth: 100,
			max_audio_bandwidth: 100,
		};
		let out = rewrite_hls(MASTER, &limits).unwrap();
		assert!(out.contains("low/index.m3u8"));
		assert_eq!(out.matches("#EXT-X-STREAM-INF").count(), 1);
	}

	#[test]
	fn media_playlists_are_left_alone() {
		let media = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:9.009,\nsegment0.ts\n#EXT-X-ENDLIST\n";
		assert_eq!(rewrite_hls(media, &limits()).as_deref(), Some(media));
		assert_eq!(rewrite_hls("not a playlist", &limits()), None);
	}

	#[test]
	fn oversized_attributes_count_as_over_the_limit() {
		let master = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=1,RESOLUTION=4294967296x4294967296
huge.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=99999999999999999999999,RESOLUTION=640x360
greedy.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=500000,RESOLUTION=640x360
fits.m3u8
";
		let out = rewrite_hls(master, &limits()).unwrap();
		assert!(out.contains("fits.m3u8"));
		assert_eq!(out.matches("#EXT-X-STREAM-INF").count(), 1);
	}

	#[test]
	fn average_bandwidth_is_not_mistaken_for_bandwidth() {
		let master = "#EXTM3U
#EXT-X-STREAM-INF:AVERAGE-BANDWIDTH=100,BANDWIDTH=3000000
a.m3u8
#EXT-X-STREAM-INF:AVERAGE-BANDWIDTH=9000000,BANDWIDTH=800000
b.m3u8
";
		let out = rewrite_hls(master, &limits()).unwrap();
		assert!(out.contains("b.m3u8"));
		assert!(!out.contains("a.m3u8"));
	}
}
