//! Shared test doubles: a recording transport over the local filesystem,
//! a hand-fired watcher and a recording command runner.
#![allow(dead_code)]

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use guestmirror::connection::Connection;
use guestmirror::error::{MirrorError, TransportError};
use guestmirror::transport::local::set_times;
use guestmirror::transport::{
	CommandRunner, Connector, LocalTransport, TransferOptions, Transport, TransportResult,
};
use guestmirror::types::{PendingStat, RemoteStat};
use guestmirror::watcher::{ChangeCallback, WatchHandle, Watcher};

/// Write a file and stamp it with `mtime`
pub fn write_file(dir: &Path, name: &str, content: &str, mtime: i64) {
	let path = dir.join(name);
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).unwrap();
	}
	fs::write(&path, content).unwrap();
	set_times(&path, PendingStat { mtime, atime: None }).unwrap();
}

pub fn read_file(dir: &Path, name: &str) -> Option<String> {
	fs::read_to_string(dir.join(name)).ok()
}

pub fn path_str(path: &Path) -> String {
	path.to_str().unwrap().to_string()
}

// ===================================================================
// RECORDING TRANSPORT
// ===================================================================

/// Local transport that remembers every mutating call
#[derive(Default)]
pub struct RecordingTransport {
	inner: LocalTransport,
	ops: Mutex<Vec<String>>,
}

impl RecordingTransport {
	fn record(&self, op: &str, path: &str) {
		self.ops.lock().unwrap().push(format!("{} {}", op, path));
	}

	pub fn ops(&self) -> Vec<String> {
		self.ops.lock().unwrap().clone()
	}

	pub fn count(&self, op: &str) -> usize {
		let prefix = format!("{} ", op);
		self.ops().iter().filter(|o| o.starts_with(&prefix)).count()
	}

	/// Operations of kind `op`, as the paths they targeted
	pub fn paths(&self, op: &str) -> Vec<String> {
		let prefix = format!("{} ", op);
		self.ops().iter().filter_map(|o| o.strip_prefix(&prefix).map(str::to_string)).collect()
	}

	pub fn clear(&self) {
		self.ops.lock().unwrap().clear();
	}
}

#[async_trait]
impl Transport for RecordingTransport {
	async fn stat(&self, path: &str) -> TransportResult<Option<RemoteStat>> {
		self.inner.stat(path).await
	}

	async fn mkdir(&self, path: &str) -> TransportResult<()> {
		self.record("mkdir", path);
		self.inner.mkdir(path).await
	}

	async fn list(&self, path: &str) -> TransportResult<Option<Vec<String>>> {
		self.inner.list(path).await
	}

	async fn upload(&self, local: &Path, remote: &str, opts: TransferOptions) -> TransportResult<()> {
		self.record("upload", remote);
		self.inner.upload(local, remote, opts).await
	}

	async fn download(
		&self,
		remote: &str,
		local: &Path,
		opts: TransferOptions,
	) -> TransportResult<()> {
		self.record("download", remote);
		self.inner.download(remote, local, opts).await
	}

	async fn remove(&self, path: &str) -> TransportResult<()> {
		self.record("remove", path);
		self.inner.remove(path).await
	}

	async fn rmdir(&self, path: &str) -> TransportResult<()> {
		self.record("rmdir", path);
		self.inner.rmdir(path).await
	}

	async fn setstat(&self, path: &str, attrs: PendingStat) -> TransportResult<()> {
		self.record("setstat", path);
		self.inner.setstat(path, attrs).await
	}

	fn endpoint(&self) -> String {
		"recording".to_string()
	}
}

pub struct RecordingConnector {
	pub transport: Arc<RecordingTransport>,
}

#[async_trait]
impl Connector for RecordingConnector {
	async fn open(&self) -> Result<Arc<dyn Transport>, MirrorError> {
		Ok(self.transport.clone())
	}

	fn endpoint(&self) -> String {
		"recording".to_string()
	}
}

/// Connector that refuses the first `failures` opens
pub struct FlakyConnector {
	pub transport: Arc<RecordingTransport>,
	pub failures: AtomicUsize,
}

#[async_trait]
impl Connector for FlakyConnector {
	async fn open(&self) -> Result<Arc<dyn Transport>, MirrorError> {
		let left = self.failures.load(Ordering::SeqCst);
		if left > 0 {
			self.failures.store(left - 1, Ordering::SeqCst);
			return Err(MirrorError::TransportUnavailable {
				endpoint: self.endpoint(),
				source: Box::new(TransportError::Disconnected),
			});
		}
		Ok(self.transport.clone())
	}

	fn endpoint(&self) -> String {
		"flaky".to_string()
	}
}

/// Recording connection whose first `failures` session opens fail
pub fn flaky_connection(failures: usize) -> (Arc<Connection>, Arc<RecordingTransport>) {
	let transport = Arc::new(RecordingTransport::default());
	let connector =
		FlakyConnector { transport: transport.clone(), failures: AtomicUsize::new(failures) };
	(Arc::new(Connection::new(Arc::new(connector), Duration::from_millis(0))), transport)
}

/// Connection whose guest side is the local filesystem, with its recorder
pub fn recording_connection() -> (Arc<Connection>, Arc<RecordingTransport>) {
	let transport = Arc::new(RecordingTransport::default());
	let connector = RecordingConnector { transport: transport.clone() };
	(Arc::new(Connection::new(Arc::new(connector), Duration::from_millis(0))), transport)
}

// ===================================================================
// MANUAL WATCHER
// ===================================================================

/// Watcher whose change callbacks are fired by the test
#[derive(Default)]
pub struct ManualWatcher {
	watches: Mutex<Vec<(PathBuf, ChangeCallback)>>,
}

impl ManualWatcher {
	pub fn roots(&self) -> Vec<PathBuf> {
		self.watches.lock().unwrap().iter().map(|(root, _)| root.clone()).collect()
	}

	/// Report a batch for the `index`-th watched root
	pub fn fire(&self, index: usize, modified: &[&str], added: &[&str], removed: &[&str]) {
		let watches = self.watches.lock().unwrap();
		let (_, callback) = &watches[index];
		callback(owned(modified), owned(added), owned(removed));
	}
}

fn owned(paths: &[&str]) -> Vec<String> {
	paths.iter().map(|p| p.to_string()).collect()
}

impl Watcher for ManualWatcher {
	fn watch(&self, root: &Path, on_change: ChangeCallback) -> Result<WatchHandle, MirrorError> {
		self.watches.lock().unwrap().push((root.to_path_buf(), on_change));
		Ok(WatchHandle::noop())
	}
}

// ===================================================================
// RECORDING COMMAND RUNNER
// ===================================================================

#[derive(Default)]
pub struct RecordingRunner {
	commands: Mutex<Vec<String>>,
}

impl RecordingRunner {
	pub fn commands(&self) -> Vec<String> {
		self.commands.lock().unwrap().clone()
	}
}

#[async_trait]
impl CommandRunner for RecordingRunner {
	async fn exec(&self, command: &str) -> TransportResult<String> {
		self.commands.lock().unwrap().push(command.to_string());
		if command.contains("fail-me") {
			return Err(TransportError::CommandFailed {
				command: command.to_string(),
				status: Some(1),
				stderr: "refused".to_string(),
			});
		}
		Ok(String::new())
	}
}

// vim: ts=4
