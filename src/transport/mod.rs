//! Remote filesystem capability used by the connection layer
//!
//! The sync engine only depends on these traits. Concrete sessions are
//! produced by a [`Connector`]; the connection reopens them when they report
//! themselves closed.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::error::{MirrorError, TransportError};
use crate::types::{PendingStat, RemoteStat};

pub mod local;
pub mod ssh;

pub use local::{LocalConnector, LocalTransport};
pub use ssh::{SshConnector, SshTransport};

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Options for a single upload or download
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferOptions {
	/// Copy a whole directory tree
	pub recursive: bool,

	/// Stamp every copied file with its source mtime (used for tree copies,
	/// where no per-file pending stat is queued)
	pub preserve_times: bool,
}

impl TransferOptions {
	pub fn file() -> Self {
		TransferOptions { recursive: false, preserve_times: false }
	}

	pub fn tree() -> Self {
		TransferOptions { recursive: true, preserve_times: true }
	}
}

/// One open session to the guest filesystem
///
/// `upload` and `download` resolve only once the destination is fully written
/// and closed; the connection treats that as the transfer-complete event.
#[async_trait]
pub trait Transport: Send + Sync {
	/// Stat a guest path, `None` if it does not exist
	async fn stat(&self, path: &str) -> TransportResult<Option<RemoteStat>>;

	async fn mkdir(&self, path: &str) -> TransportResult<()>;

	/// Entry names directly under `path`, `None` if it does not exist
	async fn list(&self, path: &str) -> TransportResult<Option<Vec<String>>>;

	async fn upload(&self, local: &Path, remote: &str, opts: TransferOptions) -> TransportResult<()>;

	async fn download(&self, remote: &str, local: &Path, opts: TransferOptions)
		-> TransportResult<()>;

	async fn remove(&self, path: &str) -> TransportResult<()>;

	/// Remove an empty directory
	async fn rmdir(&self, path: &str) -> TransportResult<()>;

	async fn setstat(&self, path: &str, attrs: PendingStat) -> TransportResult<()>;

	/// Whether the session has gone away and must be reopened
	fn is_closed(&self) -> bool {
		false
	}

	/// Human-readable endpoint, for log lines
	fn endpoint(&self) -> String;
}

/// Opens transport sessions
#[async_trait]
pub trait Connector: Send + Sync {
	/// Establish a new session.
	///
	/// Implementations apply their own retry policy and return
	/// `MirrorError::TransportUnavailable` once it is exhausted.
	async fn open(&self) -> Result<Arc<dyn Transport>, MirrorError>;

	fn endpoint(&self) -> String;
}

/// Executes shell commands on the guest (bulk-copy and symlink support)
#[async_trait]
pub trait CommandRunner: Send + Sync {
	/// Run a command, returning its standard output
	async fn exec(&self, command: &str) -> TransportResult<String>;
}

/// Quote a string for a POSIX shell
pub fn shell_quote(value: &str) -> String {
	format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_shell_quote() {
		assert_eq!(shell_quote("/var/guest"), "'/var/guest'");
		assert_eq!(shell_quote("it's"), "'it'\\''s'");
	}

	#[test]
	fn test_transfer_options() {
		assert!(!TransferOptions::file().recursive);
		assert!(TransferOptions::tree().recursive);
		assert!(TransferOptions::tree().preserve_times);
	}
}

// vim: ts=4
