//! Session chains: the path of nested sub-target sessions an event or
//! command travels through.

use std::fmt;

use wr_protocol::SessionId;

/// Ordered list of sessions from the outermost (attached to the debuggee)
/// to the innermost. An empty chain addresses the debuggee itself.
///
/// Chains are values: [`SessionChain::child`] returns a longer chain and
/// never mutates the parent, so each dispatch depth keeps its own chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SessionChain(Vec<SessionId>);

impl SessionChain {
	pub fn root() -> Self {
		Self(Vec::new())
	}

	pub fn child(&self, session: SessionId) -> Self {
		let mut sessions = self.0.clone();
		sessions.push(session);
		Self(sessions)
	}

	pub fn is_root(&self) -> bool {
		self.0.is_empty()
	}

	pub fn depth(&self) -> usize {
		self.0.len()
	}

	pub fn innermost(&self) -> Option<&SessionId> {
		self.0.last()
	}

	pub fn iter(&self) -> impl DoubleEndedIterator<Item = &SessionId> {
		self.0.iter()
	}
}

impl From<Vec<SessionId>> for SessionChain {
	fn from(sessions: Vec<SessionId>) -> Self {
		Self(sessions)
	}
}

impl fmt::Display for SessionChain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.0.is_empty() {
			return f.write_str("<root>");
		}
		for (i, session) in self.0.iter().enumerate() {
			if i > 0 {
				f.write_str(" > ")?;
			}
			f.write_str(session.as_str())?;
		}
		Ok(())
	}
}
