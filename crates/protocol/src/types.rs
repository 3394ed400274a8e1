//! Identifier newtypes and header shapes shared by commands and events.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(pub String);

		impl $name {
			pub fn new(id: impl Into<String>) -> Self {
				Self(id.into())
			}

			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl From<&str> for $name {
			fn from(id: &str) -> Self {
				Self(id.to_string())
			}
		}

		impl From<String> for $name {
			fn from(id: String) -> Self {
				Self(id)
			}
		}
	};
}

string_id!(
	/// Identifier of a sub-target debugging session (iframe, worker).
	SessionId
);
string_id!(
	/// Identifier of a browser target (tab, iframe, worker).
	TargetId
);
string_id!(
	/// Network-domain request identifier, unique while the request is outstanding.
	RequestId
);
string_id!(
	/// Fetch-domain interception identifier, distinct from the network id.
	InterceptionId
);
string_id!(
	/// Frame identifier within a page.
	FrameId
);

/// Network-domain headers: a JSON object of name to value.
pub type Headers = BTreeMap<String, String>;

/// Fetch-domain header entry. Interception events carry headers as a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
	pub name: String,
	pub value: String,
}

impl HeaderEntry {
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
		}
	}
}

/// Converts a Fetch-domain header list into the Network-domain map shape.
///
/// Repeated names are joined with `", "`, which is how the network domain
/// reports them.
pub fn headers_from_entries(entries: &[HeaderEntry]) -> Headers {
	let mut headers = Headers::new();
	for entry in entries {
		headers
			.entry(entry.name.clone())
			.and_modify(|existing| {
				existing.push_str(", ");
				existing.push_str(&entry.value);
			})
			.or_insert_with(|| entry.value.clone());
	}
	headers
}

/// Returns the raw `content-type` value from a header list, matched case-insensitively.
pub fn content_type(entries: &[HeaderEntry]) -> Option<&str> {
	entries
		.iter()
		.find(|entry| entry.name.eq_ignore_ascii_case("content-type"))
		.map(|entry| entry.value.as_str())
}
