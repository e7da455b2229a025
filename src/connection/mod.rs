//! Reusable guest session plus asynchronous transfer bookkeeping
//!
//! `upload`/`download` return immediately: the transfer runs on a spawned task
//! and the destination's pending stat is applied when it completes.
//! `finish_transfers` waits for everything enqueued so far.

pub mod statqueue;

pub use statqueue::{LocalStatQueue, RemoteStatQueue, StatQueue};

use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::MirrorError;
use crate::logging::*;
use crate::transport::{Connector, TransferOptions, Transport};
use crate::types::{guest_join, now_secs, PendingStat, RemoteStat};

// ============================================================================
// SESSION
// ============================================================================

/// Lazily opened, auto-reopening transport session
///
/// Check-and-create happens under one async lock, so concurrent callers
/// never open two sessions.
pub struct Session {
	connector: Arc<dyn Connector>,
	current: tokio::sync::Mutex<Option<Arc<dyn Transport>>>,
}

impl Session {
	pub fn new(connector: Arc<dyn Connector>) -> Self {
		Session { connector, current: tokio::sync::Mutex::new(None) }
	}

	/// Current session, opening a new one if there is none or it was closed
	pub async fn get(&self) -> Result<Arc<dyn Transport>, MirrorError> {
		let mut current = self.current.lock().await;
		if let Some(transport) = current.as_ref() {
			if !transport.is_closed() {
				return Ok(transport.clone());
			}
			info!("Session to {} closed, reconnecting", transport.endpoint());
		}

		let transport = self.connector.open().await?;
		*current = Some(transport.clone());
		Ok(transport)
	}

	/// Drop the current session
	pub async fn close(&self) {
		*self.current.lock().await = None;
	}
}

// ============================================================================
// TRANSFERS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
	Upload,
	Download,
}

#[derive(Debug, Clone)]
struct Transfer {
	direction: Direction,
	local: PathBuf,
	remote: String,
	opts: TransferOptions,
}

impl Transfer {
	/// Key of the destination in its stat queue
	fn destination(&self) -> String {
		match self.direction {
			Direction::Upload => self.remote.clone(),
			Direction::Download => stat_key(&self.local),
		}
	}
}

fn stat_key(path: &Path) -> String {
	path.to_string_lossy().into_owned()
}

/// Counts of operations issued through a connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
	pub uploads: usize,
	pub downloads: usize,
	pub deletes: usize,
}

#[derive(Debug, Default)]
struct Counters {
	uploads: AtomicUsize,
	downloads: AtomicUsize,
	deletes: AtomicUsize,
}

/// State shared with in-flight transfer tasks
struct Shared {
	session: Arc<Session>,
	local_stats: LocalStatQueue,
	remote_stats: RemoteStatQueue,
	outstanding: AtomicUsize,
	counters: Counters,
}

impl Shared {
	async fn run(&self, transfer: Transfer) -> Result<(), MirrorError> {
		let result = self.transfer(&transfer).await;
		let result = match result {
			Ok(()) => self.on_close(&transfer).await,
			Err(e) => Err(e),
		};
		self.on_finish();
		result
	}

	async fn transfer(&self, transfer: &Transfer) -> Result<(), MirrorError> {
		let transport = self.session.get().await?;
		match transfer.direction {
			Direction::Upload => {
				transport.upload(&transfer.local, &transfer.remote, transfer.opts).await?
			}
			Direction::Download => {
				transport.download(&transfer.remote, &transfer.local, transfer.opts).await?
			}
		}
		Ok(())
	}

	/// A single transfer completed: apply the stat queued for its destination
	async fn on_close(&self, transfer: &Transfer) -> Result<(), MirrorError> {
		let destination = transfer.destination();
		let applied = match transfer.direction {
			Direction::Upload => self.remote_stats.apply(&destination).await?,
			Direction::Download => self.local_stats.apply(&destination).await?,
		};
		if let Some(stat) = applied {
			debug!("Stamped {} with mtime {}", destination, stat.mtime);
		}
		Ok(())
	}

	/// Reports completion once nothing is outstanding any more
	fn on_finish(&self) {
		if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
			info!("All transfers completed");
		}
	}
}

// ============================================================================
// CONNECTION
// ============================================================================

pub struct Connection {
	shared: Arc<Shared>,
	transfers: Mutex<Vec<JoinHandle<Result<(), MirrorError>>>>,
}

impl Connection {
	/// Create a connection; no session is opened until first use
	pub fn new(connector: Arc<dyn Connector>, local_stat_delay: Duration) -> Self {
		let session = Arc::new(Session::new(connector));
		let shared = Shared {
			session: session.clone(),
			local_stats: LocalStatQueue::new(local_stat_delay),
			remote_stats: RemoteStatQueue::new(session),
			outstanding: AtomicUsize::new(0),
			counters: Counters::default(),
		};
		Connection { shared: Arc::new(shared), transfers: Mutex::new(vec![]) }
	}

	/// Open the session if needed and return it
	pub async fn connect(&self) -> Result<Arc<dyn Transport>, MirrorError> {
		self.shared.session.get().await
	}

	/// Queue a host-to-guest file transfer, stamping the guest file with `mtime`
	pub fn upload(&self, host_path: &Path, guest_path: &str, mtime: i64) {
		self.shared
			.remote_stats
			.queue(guest_path, PendingStat { mtime, atime: Some(now_secs()) });
		info!(">> {}", host_path.display());
		self.shared.counters.uploads.fetch_add(1, Ordering::SeqCst);
		self.enqueue(Transfer {
			direction: Direction::Upload,
			local: host_path.to_path_buf(),
			remote: guest_path.to_string(),
			opts: TransferOptions::file(),
		});
	}

	/// Queue a guest-to-host file transfer, stamping the host file with `mtime`
	pub fn download(&self, guest_path: &str, host_path: &Path, mtime: i64) {
		self.shared.local_stats.queue(&stat_key(host_path), PendingStat { mtime, atime: None });
		info!("<< {}", guest_path);
		self.shared.counters.downloads.fetch_add(1, Ordering::SeqCst);
		self.enqueue(Transfer {
			direction: Direction::Download,
			local: host_path.to_path_buf(),
			remote: guest_path.to_string(),
			opts: TransferOptions::file(),
		});
	}

	/// Queue a recursive copy of a whole host directory to the guest
	pub fn upload_tree(&self, host_dir: &Path, guest_dir: &str) {
		info!(">> {}/", host_dir.display());
		self.shared.counters.uploads.fetch_add(1, Ordering::SeqCst);
		self.enqueue(Transfer {
			direction: Direction::Upload,
			local: host_dir.to_path_buf(),
			remote: guest_dir.to_string(),
			opts: TransferOptions::tree(),
		});
	}

	/// Queue a recursive copy of a whole guest directory to the host
	pub fn download_tree(&self, guest_dir: &str, host_dir: &Path) {
		info!("<< {}/", guest_dir);
		self.shared.counters.downloads.fetch_add(1, Ordering::SeqCst);
		self.enqueue(Transfer {
			direction: Direction::Download,
			local: host_dir.to_path_buf(),
			remote: guest_dir.to_string(),
			opts: TransferOptions::tree(),
		});
	}

	fn enqueue(&self, transfer: Transfer) {
		self.shared.outstanding.fetch_add(1, Ordering::SeqCst);
		let shared = self.shared.clone();
		let handle = tokio::spawn(async move { shared.run(transfer).await });
		if let Ok(mut transfers) = self.transfers.lock() {
			transfers.push(handle);
		}
	}

	/// Guest stat, `None` if the path does not exist
	pub async fn stat(&self, path: &str) -> Result<Option<RemoteStat>, MirrorError> {
		Ok(self.connect().await?.stat(path).await?)
	}

	pub async fn exists(&self, path: &str) -> Result<bool, MirrorError> {
		Ok(self.stat(path).await?.is_some())
	}

	/// Guest mtime in whole seconds, `None` if the path does not exist
	pub async fn mtime(&self, path: &str) -> Result<Option<i64>, MirrorError> {
		Ok(self.connect().await?.stat(path).await?.map(|s| s.mtime))
	}

	pub async fn is_directory(&self, path: &str) -> Result<bool, MirrorError> {
		Ok(self.connect().await?.stat(path).await?.map(|s| s.is_dir).unwrap_or(false))
	}

	pub async fn mkdir(&self, path: &str) -> Result<(), MirrorError> {
		self.connect().await?.mkdir(path).await?;
		Ok(())
	}

	/// Entry names directly under `path`; empty if it does not exist
	pub async fn list(&self, path: &str) -> Result<BTreeSet<String>, MirrorError> {
		let names = self.connect().await?.list(path).await?.unwrap_or_default();
		Ok(names.into_iter().filter(|n| n != "." && n != "..").collect())
	}

	/// Delete a guest file, or a whole directory tree
	pub async fn delete(&self, path: &str) -> Result<(), MirrorError> {
		let transport = self.connect().await?;
		match transport.stat(path).await? {
			Some(stat) if stat.is_dir => {
				remove_tree(transport, path.to_string()).await?;
				warn!("XX {}", path);
			}
			Some(_) => {
				transport.remove(path).await?;
				warn!("xx {}", path);
			}
			None => {
				debug!("{} already gone from guest", path);
				return Ok(());
			}
		}
		self.shared.counters.deletes.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	/// Wait for every transfer enqueued so far, and for their deferred
	/// metadata writes.
	///
	/// Failed transfers are logged; the first error that is fatal to the
	/// session is returned after everything has been drained.
	pub async fn finish_transfers(&self) -> Result<(), MirrorError> {
		let mut fatal = None;

		loop {
			let handles = self.take_transfers();
			if handles.is_empty() {
				break;
			}
			for handle in handles {
				match handle.await {
					Ok(Ok(())) => {}
					Ok(Err(e)) if e.is_fatal() => {
						error!("{}", e);
						if fatal.is_none() {
							fatal = Some(e);
						}
					}
					Ok(Err(e)) => error!("Transfer failed: {}", e),
					Err(e) => error!("Transfer task panicked: {}", e),
				}
			}
		}

		self.shared.local_stats.settle().await;

		match fatal {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}

	fn take_transfers(&self) -> Vec<JoinHandle<Result<(), MirrorError>>> {
		self.transfers.lock().map(|mut t| std::mem::take(&mut *t)).unwrap_or_default()
	}

	/// Transfers enqueued but not yet completed
	pub fn outstanding(&self) -> usize {
		self.shared.outstanding.load(Ordering::SeqCst)
	}

	pub fn stats(&self) -> TransferStats {
		let c = &self.shared.counters;
		TransferStats {
			uploads: c.uploads.load(Ordering::SeqCst),
			downloads: c.downloads.load(Ordering::SeqCst),
			deletes: c.deletes.load(Ordering::SeqCst),
		}
	}

	/// Drop the session; the next operation reconnects
	pub async fn close(&self) {
		self.shared.session.close().await;
	}
}

fn remove_tree(
	transport: Arc<dyn Transport>,
	path: String,
) -> Pin<Box<dyn Future<Output = Result<(), MirrorError>> + Send>> {
	Box::pin(async move {
		for name in transport.list(&path).await?.unwrap_or_default() {
			if name == "." || name == ".." {
				continue;
			}
			let child = guest_join(&path, &name);
			match transport.stat(&child).await? {
				Some(stat) if stat.is_dir => remove_tree(transport.clone(), child).await?,
				Some(_) => transport.remove(&child).await?,
				None => {}
			}
		}
		transport.rmdir(&path).await?;
		Ok(())
	})
}


// vim: ts=4
