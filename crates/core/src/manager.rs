//! Owning table of recorders, one per target.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};
use wr_protocol::TargetId;

use crate::collaborators::{Collaborators, Debuggee};
use crate::config::RecorderConfig;
use crate::controller::{RecorderController, RecorderStatus};
use crate::error::Result;
use crate::size::ArchiveSize;

type Table = Arc<Mutex<HashMap<TargetId, Arc<RecorderController>>>>;

/// Starts, stops, and tracks recorders by target.
///
/// Entries are inserted on start and removed only when the target is
/// confirmed closed, so a stopped recorder can be resumed.
pub struct RecordingManager {
	config: RecorderConfig,
	collaborators: Collaborators,
	archive_size: ArchiveSize,
	recorders: Table,
}

impl RecordingManager {
	pub fn new(config: RecorderConfig, collaborators: Collaborators) -> Self {
		Self {
			config,
			collaborators,
			archive_size: ArchiveSize::new(),
			recorders: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	/// Bytes committed by every recorder this manager started.
	pub fn archive_size(&self) -> &ArchiveSize {
		&self.archive_size
	}

	pub fn recorder(&self, target: &TargetId) -> Option<Arc<RecorderController>> {
		self.recorders.lock().get(target).cloned()
	}

	pub fn targets(&self) -> Vec<TargetId> {
		self.recorders.lock().keys().cloned().collect()
	}

	/// Starts recording `target`, resuming its existing recorder if there is
	/// one (in which case `debuggee` is not used).
	pub async fn start(&self, target: TargetId, debuggee: Arc<dyn Debuggee>) -> Result<Arc<RecorderController>> {
		let existing = self.recorder(&target);
		let recorder = match existing {
			Some(recorder) => {
				debug!(target = "wr.recorder", target_id = %target, "resuming recorder");
				recorder
			}
			None => {
				let recorder = RecorderController::new(target.clone(), debuggee, self.config.clone(), self.collaborators.clone(), self.archive_size.clone())?;
				self.recorders.lock().insert(target.clone(), Arc::clone(&recorder));
				recorder
			}
		};

		recorder.attach().await?;
		self.watch_closure(&recorder);
		Ok(recorder)
	}

	/// Removes the recorder from the table once its target closes.
	fn watch_closure(&self, recorder: &Arc<RecorderController>) {
		let table = Arc::clone(&self.recorders);
		let recorder = Arc::clone(recorder);
		tokio::spawn(async move {
			if recorder.ended().await == RecorderStatus::TargetClosed {
				let removed = remove_if_same(&table, &recorder);
				debug!(target = "wr.recorder", target_id = %recorder.target(), removed, "closed target dropped");
			}
		});
	}

	/// Stops the recorder for `target`. Returns `false` if there is none.
	pub async fn stop(&self, target: &TargetId) -> bool {
		match self.recorder(target) {
			Some(recorder) => {
				recorder.stop().await;
				true
			}
			None => false,
		}
	}

	/// Stops every running recorder.
	pub async fn stop_all(&self) {
		let running: Vec<_> = self.recorders.lock().values().filter(|recorder| recorder.is_running()).cloned().collect();
		info!(target = "wr.recorder", count = running.len(), "stopping all recorders");
		for recorder in running {
			recorder.stop().await;
		}
	}

	/// Handles confirmed closure of `target`: ends its recording without
	/// detaching and drops it from the table.
	pub async fn on_target_closed(&self, target: &TargetId) -> bool {
		let Some(recorder) = self.recorders.lock().remove(target) else {
			return false;
		};
		recorder.target_closed("target closed").await;
		true
	}
}

fn remove_if_same(table: &Table, recorder: &Arc<RecorderController>) -> bool {
	let mut table = table.lock();
	match table.get(recorder.target()) {
		Some(current) if Arc::ptr_eq(current, recorder) => table.remove(recorder.target()).is_some(),
		_ => false,
	}
}
