//! One-shot reconciliation of two whole directory trees

use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::sync::Arc;

use super::{compare_and_transfer, SyncPaths};
use crate::error::MirrorError;
use crate::exclusion::ExcludeMatcher;
use crate::logging::*;
use crate::types::{normalize_relative, RemoteStat};

pub struct TreeSynchronizer {
	paths: SyncPaths,
	excludes: Option<Arc<ExcludeMatcher>>,
}

impl TreeSynchronizer {
	pub fn new(paths: SyncPaths) -> Self {
		TreeSynchronizer { paths, excludes: None }
	}

	/// Skip entries matching these patterns while walking
	pub fn with_excludes(mut self, excludes: Arc<ExcludeMatcher>) -> Self {
		self.excludes = Some(excludes);
		self
	}

	/// Reconcile the subtree at `relative` (`/` for the whole mirror)
	///
	/// Transfers are only enqueued; call `finish_transfers` on the connection
	/// to wait for them.
	pub async fn execute(&self, relative: &str) -> Result<(), MirrorError> {
		let relative = normalize_relative(relative);
		let host_path = self.paths.host_path(&relative);
		let guest_path = self.paths.guest_path(&relative);

		let host = host_metadata(&host_path).await?;
		let guest = self.paths.connection.stat(&guest_path).await?;

		let host_dir = host.as_ref().map(|m| m.is_dir());
		let guest_dir = guest.map(|s| s.is_dir);

		match (host_dir, guest_dir) {
			(Some(true), None) => {
				self.paths.connection.upload_tree(&host_path, &guest_path);
				Ok(())
			}
			(None, Some(true)) => {
				self.paths.connection.download_tree(&guest_path, &host_path);
				Ok(())
			}
			(Some(true), Some(true)) => self.sync_dir(relative).await,
			_ => self.sync_entry(relative, host, guest).await,
		}
	}

	fn sync_dir(&self, relative: String) -> BoxFuture<'_, Result<(), MirrorError>> {
		Box::pin(async move {
			let host_path = self.paths.host_path(&relative);
			let guest_path = self.paths.guest_path(&relative);

			let mut names = host_entries(&host_path).await?;
			names.extend(self.paths.connection.list(&guest_path).await?);

			for name in names {
				let child = if relative.is_empty() { name } else { format!("{}/{}", relative, name) };
				if self.is_excluded(&child)? {
					debug!("Skipping excluded {}", child);
					continue;
				}

				let host = host_metadata(&self.paths.host_path(&child)).await?;
				let guest = self.paths.connection.stat(&self.paths.guest_path(&child)).await?;
				let host_dir = host.as_ref().map(|m| m.is_dir());
				let guest_dir = guest.map(|s| s.is_dir);

				match (host_dir, guest_dir) {
					(Some(true), Some(true)) => self.sync_dir(child).await?,
					(Some(true), None) => {
						self.paths
							.connection
							.upload_tree(&self.paths.host_path(&child), &self.paths.guest_path(&child));
					}
					(None, Some(true)) => {
						self.paths
							.connection
							.download_tree(&self.paths.guest_path(&child), &self.paths.host_path(&child));
					}
					_ => self.sync_entry(child, host, guest).await?,
				}
			}
			Ok(())
		})
	}

	/// Reconcile a single non-directory entry
	async fn sync_entry(
		&self,
		relative: String,
		host: Option<Metadata>,
		guest: Option<RemoteStat>,
	) -> Result<(), MirrorError> {
		let host_dir = host.map(|m| m.is_dir()).unwrap_or(false);
		let guest_dir = guest.map(|s| s.is_dir).unwrap_or(false);
		if host_dir || guest_dir {
			error!("{}", MirrorError::TypeConflict { path: relative });
			return Ok(());
		}
		compare_and_transfer(&self.paths, &relative).await?;
		Ok(())
	}

	fn is_excluded(&self, relative: &str) -> Result<bool, MirrorError> {
		match &self.excludes {
			Some(excludes) => excludes.is_excluded(relative),
			None => Ok(false),
		}
	}
}

async fn host_metadata(path: &Path) -> io::Result<Option<Metadata>> {
	match tokio::fs::metadata(path).await {
		Ok(meta) => Ok(Some(meta)),
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(e),
	}
}

async fn host_entries(path: &Path) -> io::Result<BTreeSet<String>> {
	let mut names = BTreeSet::new();
	let mut entries = match tokio::fs::read_dir(path).await {
		Ok(entries) => entries,
		Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(names),
		Err(e) => return Err(e),
	};
	while let Some(entry) = entries.next_entry().await? {
		names.insert(entry.file_name().to_string_lossy().into_owned());
	}
	Ok(names)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::connection::Connection;
	use crate::transport::local::set_times;
	use crate::transport::LocalConnector;
	use crate::types::PendingStat;
	use std::fs;
	use std::time::Duration;
	use tempfile::TempDir;

	fn synchronizer(host: &Path, guest: &Path) -> TreeSynchronizer {
		let conn = Arc::new(Connection::new(Arc::new(LocalConnector), Duration::from_millis(0)));
		TreeSynchronizer::new(SyncPaths::new(host, guest.to_str().unwrap(), conn))
	}

	#[tokio::test]
	async fn test_missing_guest_root_is_one_tree_upload() {
		let host = TempDir::new().unwrap();
		let guest = TempDir::new().unwrap();
		fs::create_dir_all(host.path().join("a/b")).unwrap();
		fs::write(host.path().join("a/b/c.txt"), "c").unwrap();
		fs::write(host.path().join("top.txt"), "t").unwrap();

		let target = guest.path().join("mirror");
		let sync = synchronizer(host.path(), &target);
		sync.execute("/").await.unwrap();
		sync.paths.connection.finish_transfers().await.unwrap();

		assert_eq!(sync.paths.connection.stats().uploads, 1);
		assert_eq!(fs::read_to_string(target.join("a/b/c.txt")).unwrap(), "c");
		assert_eq!(fs::read_to_string(target.join("top.txt")).unwrap(), "t");
	}

	#[tokio::test]
	async fn test_type_conflict_is_skipped() {
		let host = TempDir::new().unwrap();
		let guest = TempDir::new().unwrap();
		fs::create_dir(host.path().join("thing")).unwrap();
		fs::write(host.path().join("thing/inner"), "x").unwrap();
		fs::write(guest.path().join("thing"), "file on guest").unwrap();

		let sync = synchronizer(host.path(), guest.path());
		sync.execute("/").await.unwrap();
		sync.paths.connection.finish_transfers().await.unwrap();

		assert_eq!(sync.paths.connection.stats(), Default::default());
		assert_eq!(fs::read_to_string(guest.path().join("thing")).unwrap(), "file on guest");
	}

	#[tokio::test]
	async fn test_excluded_entries_are_not_walked() {
		let host = TempDir::new().unwrap();
		let guest = TempDir::new().unwrap();
		fs::create_dir(host.path().join("cache")).unwrap();
		fs::write(host.path().join("cache/big.bin"), "x").unwrap();
		fs::write(host.path().join("keep.txt"), "k").unwrap();
		set_times(&host.path().join("keep.txt"), PendingStat { mtime: 5000, atime: None }).unwrap();

		let sync = synchronizer(host.path(), guest.path())
			.with_excludes(Arc::new(ExcludeMatcher::new(vec!["cache"])));
		sync.execute("/").await.unwrap();
		sync.paths.connection.finish_transfers().await.unwrap();

		assert!(!guest.path().join("cache").exists());
		assert_eq!(fs::read_to_string(guest.path().join("keep.txt")).unwrap(), "k");
	}
}

// vim: ts=4
