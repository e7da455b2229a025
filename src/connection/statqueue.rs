//! Pending metadata applied once a transfer completes
//!
//! A transfer registers the mtime (and optionally atime) its destination must
//! end up with. When the transfer reports completion the entry for that exact
//! destination is taken out of the queue and applied. A newer entry for the
//! same path replaces an unapplied older one.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::Session;
use crate::error::MirrorError;
use crate::logging::*;
use crate::transport::local::set_times;
use crate::types::PendingStat;

/// Path-keyed map of pending stats
#[derive(Debug, Default)]
struct PendingStats {
	entries: Mutex<HashMap<String, PendingStat>>,
}

impl PendingStats {
	fn insert(&self, path: String, stat: PendingStat) {
		if let Ok(mut entries) = self.entries.lock() {
			entries.insert(path, stat);
		}
	}

	fn get(&self, path: &str) -> Option<PendingStat> {
		self.entries.lock().ok().and_then(|entries| entries.get(path).copied())
	}

	fn take(&self, path: &str) -> Option<PendingStat> {
		self.entries.lock().ok().and_then(|mut entries| entries.remove(path))
	}

	fn len(&self) -> usize {
		self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
	}
}

/// Queue of metadata waiting for a transfer to finish
#[async_trait]
pub trait StatQueue: Send + Sync {
	/// Register (or replace) the stat for a destination path
	fn queue(&self, path: &str, stat: PendingStat);

	/// Peek at the stat waiting for a path
	fn queued(&self, path: &str) -> Option<PendingStat>;

	/// Take the stat for a path and apply it; returns what was applied
	async fn apply(&self, path: &str) -> Result<Option<PendingStat>, MirrorError>;

	/// Number of entries still waiting
	fn pending(&self) -> usize;
}

// ============================================================================
// REMOTE
// ============================================================================

/// Stats for guest files, applied through the transport
pub struct RemoteStatQueue {
	pending: PendingStats,
	session: Arc<Session>,
}

impl RemoteStatQueue {
	pub(crate) fn new(session: Arc<Session>) -> Self {
		RemoteStatQueue { pending: PendingStats::default(), session }
	}
}

#[async_trait]
impl StatQueue for RemoteStatQueue {
	fn queue(&self, path: &str, stat: PendingStat) {
		self.pending.insert(path.to_string(), stat);
	}

	fn queued(&self, path: &str) -> Option<PendingStat> {
		self.pending.get(path)
	}

	async fn apply(&self, path: &str) -> Result<Option<PendingStat>, MirrorError> {
		let stat = match self.pending.take(path) {
			Some(stat) => stat,
			None => return Ok(None),
		};
		let transport = self.session.get().await?;
		transport.setstat(path, stat).await?;
		Ok(Some(stat))
	}

	fn pending(&self) -> usize {
		self.pending.len()
	}
}

// ============================================================================
// LOCAL
// ============================================================================

/// Stats for host files
///
/// The write is deferred by `delay` on a background task so it never races
/// the handle the finished download may still hold. Deferred writes are
/// tracked so [`LocalStatQueue::settle`] can wait for them.
pub struct LocalStatQueue {
	pending: PendingStats,
	delay: Duration,
	deferred: Mutex<Vec<JoinHandle<()>>>,
}

impl LocalStatQueue {
	pub fn new(delay: Duration) -> Self {
		LocalStatQueue { pending: PendingStats::default(), delay, deferred: Mutex::new(vec![]) }
	}

	/// Wait for every deferred metadata write scheduled so far
	pub async fn settle(&self) {
		loop {
			let handles = self.take_deferred();
			if handles.is_empty() {
				return;
			}
			for handle in handles {
				if let Err(e) = handle.await {
					error!("Deferred metadata write panicked: {}", e);
				}
			}
		}
	}

	fn take_deferred(&self) -> Vec<JoinHandle<()>> {
		self.deferred.lock().map(|mut deferred| std::mem::take(&mut *deferred)).unwrap_or_default()
	}
}

#[async_trait]
impl StatQueue for LocalStatQueue {
	fn queue(&self, path: &str, stat: PendingStat) {
		self.pending.insert(path.to_string(), stat);
	}

	fn queued(&self, path: &str) -> Option<PendingStat> {
		self.pending.get(path)
	}

	async fn apply(&self, path: &str) -> Result<Option<PendingStat>, MirrorError> {
		let stat = match self.pending.take(path) {
			Some(stat) => stat,
			None => return Ok(None),
		};

		let delay = self.delay;
		let target = PathBuf::from(path);
		let handle = tokio::spawn(async move {
			if !delay.is_zero() {
				tokio::time::sleep(delay).await;
			}
			if let Err(e) = set_times(&target, stat) {
				error!("Cannot set mtime on {}: {}", target.display(), e);
			}
		});

		if let Ok(mut deferred) = self.deferred.lock() {
			deferred.push(handle);
		}
		Ok(Some(stat))
	}

	fn pending(&self) -> usize {
		self.pending.len()
	}
}


// vim: ts=4
