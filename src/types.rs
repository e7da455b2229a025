//! Shared value types: change notifications, remote stats and pending metadata

use std::fmt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Which side of a mirrored pair a change was observed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
	Host,
	Guest,
}

impl fmt::Display for Side {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Side::Host => write!(f, "host"),
			Side::Guest => write!(f, "guest"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
	Added,
	Modified,
	Removed,
}

/// A single change notification, consumed once by a folder worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
	pub source: Side,
	pub kind: ChangeKind,
	/// Path relative to the mirrored root, `/` separated, no leading slash
	pub path: String,
}

impl ChangeEvent {
	pub fn new(source: Side, kind: ChangeKind, path: impl AsRef<str>) -> Self {
		ChangeEvent { source, kind, path: normalize_relative(path.as_ref()) }
	}

	pub fn added(source: Side, path: impl AsRef<str>) -> Self {
		Self::new(source, ChangeKind::Added, path)
	}

	pub fn modified(source: Side, path: impl AsRef<str>) -> Self {
		Self::new(source, ChangeKind::Modified, path)
	}

	pub fn removed(source: Side, path: impl AsRef<str>) -> Self {
		Self::new(source, ChangeKind::Removed, path)
	}
}

/// Result of a successful remote stat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
	/// Modification time in whole seconds since the epoch
	pub mtime: i64,
	pub is_dir: bool,
}

/// Metadata waiting to be applied once the transfer to `path` completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingStat {
	pub mtime: i64,
	pub atime: Option<i64>,
}

/// Convert a relative path into the canonical `a/b/c` form
///
/// Backslashes become slashes, leading/trailing slashes and `.` segments are dropped.
/// The mirror root itself is the empty string.
pub fn normalize_relative(path: &str) -> String {
	path.replace('\\', "/")
		.split('/')
		.filter(|segment| !segment.is_empty() && *segment != ".")
		.collect::<Vec<_>>()
		.join("/")
}

/// Join a relative path onto a `/`-separated guest root
pub fn guest_join(root: &str, relative: &str) -> String {
	let relative = normalize_relative(relative);
	let root = if root.len() > 1 { root.trim_end_matches('/') } else { root };
	if relative.is_empty() {
		root.to_string()
	} else if root.ends_with('/') {
		format!("{}{}", root, relative)
	} else {
		format!("{}/{}", root, relative)
	}
}

/// Parent of a `/`-separated guest path, if it has one
pub fn guest_parent(path: &str) -> Option<&str> {
	let trimmed = path.trim_end_matches('/');
	match trimmed.rfind('/') {
		Some(0) => Some("/"),
		Some(pos) => Some(&trimmed[..pos]),
		None => None,
	}
}

/// Whole-second representation of a timestamp
pub fn unix_secs(time: SystemTime) -> i64 {
	match time.duration_since(UNIX_EPOCH) {
		Ok(d) => d.as_secs() as i64,
		Err(e) => -(e.duration().as_secs() as i64),
	}
}

/// Current time in whole seconds
pub fn now_secs() -> i64 {
	unix_secs(SystemTime::now())
}

/// Host metadata, or `None` if the path does not exist
///
/// Only `NotFound` counts as absent; any other error is returned.
pub async fn host_metadata(path: &Path) -> std::io::Result<Option<std::fs::Metadata>> {
	match tokio::fs::metadata(path).await {
		Ok(meta) => Ok(Some(meta)),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(e),
	}
}

/// Host mtime in whole seconds, or `None` if the path does not exist
pub async fn host_mtime(path: &Path) -> std::io::Result<Option<i64>> {
	match host_metadata(path).await? {
		Some(meta) => Ok(Some(unix_secs(meta.modified()?))),
		None => Ok(None),
	}
}


// vim: ts=4
