//! Applies one batch of change notifications from a single side

use std::io;

use super::{compare_and_transfer, SyncPaths};
use crate::error::MirrorError;
use crate::logging::*;
use crate::types::{normalize_relative, Side};

pub struct ChangeSynchronizer {
	paths: SyncPaths,
}

impl ChangeSynchronizer {
	pub fn new(paths: SyncPaths) -> Self {
		ChangeSynchronizer { paths }
	}

	pub fn paths(&self) -> &SyncPaths {
		&self.paths
	}

	/// Apply a batch reported by `source`, then wait for its transfers.
	///
	/// Added and modified paths go through the mtime comparison in order;
	/// removals are handled afterwards and only ever delete on the side
	/// opposite to `source`. Per-file failures are logged and skipped, while
	/// fatal errors abort the batch.
	pub async fn execute(
		&self,
		source: Side,
		added: &[String],
		modified: &[String],
		removed: &[String],
	) -> Result<(), MirrorError> {
		for relative in added.iter().chain(modified.iter()) {
			let result = compare_and_transfer(&self.paths, relative).await.map(|_| ());
			recover(relative, result)?;
		}

		for relative in removed {
			let result = self.remove_opposite(source, relative).await;
			recover(relative, result)?;
		}

		self.paths.connection.finish_transfers().await
	}

	/// Delete `relative` on the side opposite to `source`, if it is there
	pub async fn remove_opposite(&self, source: Side, relative: &str) -> Result<(), MirrorError> {
		let relative = normalize_relative(relative);
		match source {
			Side::Host => {
				let guest_path = self.paths.guest_path(&relative);
				if self.paths.connection.exists(&guest_path).await? {
					self.paths.connection.delete(&guest_path).await?;
				} else {
					info!("{} was not found on guest - nothing to delete", relative);
				}
			}
			Side::Guest => {
				let host_path = self.paths.host_path(&relative);
				match tokio::fs::metadata(&host_path).await {
					Ok(meta) if meta.is_dir() => {
						tokio::fs::remove_dir_all(&host_path).await?;
						warn!("XX {}", host_path.display());
					}
					Ok(_) => {
						tokio::fs::remove_file(&host_path).await?;
						warn!("xx {}", host_path.display());
					}
					Err(e) if e.kind() == io::ErrorKind::NotFound => {
						info!("{} was not found on host - nothing to delete", relative);
					}
					Err(e) => return Err(e.into()),
				}
			}
		}
		Ok(())
	}
}

/// Keep going after a per-file failure, stop on a fatal one
fn recover(relative: &str, result: Result<(), MirrorError>) -> Result<(), MirrorError> {
	match result {
		Err(e) if e.is_fatal() => Err(e),
		Err(e) => {
			error!("Cannot sync {}: {}", relative, e);
			Ok(())
		}
		Ok(()) => Ok(()),
	}
}


// vim: ts=4
