//! Web recording over the Chrome DevTools Protocol.
//!
//! A [`RecorderController`] attaches to one page, follows its nested
//! sub-targets, and turns the network traffic it observes into finished
//! [`PendingRequest`] records and [`PageInfo`] snapshots for an
//! [`ArchiveWriter`]. Intercepted responses can be rewritten on the way to
//! the page (see [`rewrite`]). [`RecordingManager`] owns the recorders of a
//! process, keyed by target.

pub mod collaborators;
pub mod config;
pub mod controller;
pub mod error;
pub mod manager;
pub mod page;
pub mod request;
pub mod rewrite;
pub mod size;
pub mod text;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use collaborators::{ArchiveWriter, Collaborators, Debuggee, NoopIndexer, NoopSignals, PageIndexer, PageSignals, RefetchRequest, TextExtractor};
pub use config::{HtmlRuleConfig, RecorderConfig, RewriteConfig};
pub use controller::{RecorderController, RecorderStatus, SessionInfo};
pub use error::{RecorderError, Result};
pub use manager::RecordingManager;
pub use page::{PageInfo, PageLifecycle};
pub use request::{PendingRequest, Source};
pub use rewrite::{ContentKind, ResponseRewriter};
pub use size::{ArchiveSize, format_bytes};
pub use text::DomTextExtractor;
pub use tracker::{BodySource, FinishOutcome, RequestTracker};
