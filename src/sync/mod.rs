//! Synchronizers reconciling a host root with its guest counterpart
//!
//! Both synchronizers share [`SyncPaths`] for path mapping and the
//! mtime-precedence rule in [`compare_and_transfer`].

pub mod changes;
pub mod tree;

pub use changes::ChangeSynchronizer;
pub use tree::TreeSynchronizer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::connection::Connection;
use crate::error::MirrorError;
use crate::logging::*;
use crate::types::{guest_join, host_mtime, normalize_relative};

/// Roots of one mirrored pair and the connection serving its guest side
#[derive(Clone)]
pub struct SyncPaths {
	pub host_root: PathBuf,
	pub guest_root: String,
	pub connection: Arc<Connection>,
}

impl SyncPaths {
	pub fn new(
		host_root: impl Into<PathBuf>,
		guest_root: impl Into<String>,
		connection: Arc<Connection>,
	) -> Self {
		SyncPaths { host_root: host_root.into(), guest_root: guest_root.into(), connection }
	}

	/// Absolute host path for a relative path
	pub fn host_path(&self, relative: &str) -> PathBuf {
		let relative = normalize_relative(relative);
		if relative.is_empty() {
			self.host_root.clone()
		} else {
			self.host_root.join(relative)
		}
	}

	/// Absolute guest path for a relative path
	pub fn guest_path(&self, relative: &str) -> String {
		guest_join(&self.guest_root, relative)
	}

	pub async fn host_mtime(&self, path: &Path) -> Result<Option<i64>, MirrorError> {
		Ok(host_mtime(path).await?)
	}

	pub async fn guest_mtime(&self, path: &str) -> Result<Option<i64>, MirrorError> {
		self.connection.mtime(path).await
	}
}

/// What [`compare_and_transfer`] decided for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
	None,
	Upload,
	Download,
}

/// Bring one file up to date on whichever side is older
///
/// The newer side wins; equal whole-second mtimes mean nothing to do. A file
/// missing on both sides is logged and skipped.
pub async fn compare_and_transfer(paths: &SyncPaths, relative: &str) -> Result<Transfer, MirrorError> {
	let host_path = paths.host_path(relative);
	let guest_path = paths.guest_path(relative);

	let host = paths.host_mtime(&host_path).await?;
	let guest = paths.guest_mtime(&guest_path).await?;

	let decision = match (host, guest) {
		(None, None) => {
			let e = MirrorError::BothSidesMissing { path: normalize_relative(relative) };
			error!("{}", e);
			Transfer::None
		}
		(Some(h), Some(g)) if h == g => Transfer::None,
		(Some(h), None) => {
			paths.connection.upload(&host_path, &guest_path, h);
			Transfer::Upload
		}
		(Some(h), Some(g)) if h > g => {
			paths.connection.upload(&host_path, &guest_path, h);
			Transfer::Upload
		}
		(_, Some(g)) => {
			paths.connection.download(&guest_path, &host_path, g);
			Transfer::Download
		}
	};
	Ok(decision)
}


// vim: ts=4
