//! Transport over the local filesystem
//!
//! Used when the guest root is reachable as a local path (a mounted share),
//! and as the guest side in tests.

use async_trait::async_trait;
use filetime::FileTime;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::fs as afs;

use super::{CommandRunner, Connector, TransferOptions, Transport, TransportResult};
use crate::error::{MirrorError, TransportError};
use crate::types::{unix_secs, PendingStat, RemoteStat};

#[derive(Debug, Clone, Default)]
pub struct LocalTransport;

impl LocalTransport {
	pub fn new() -> Self {
		LocalTransport
	}
}

#[async_trait]
impl Transport for LocalTransport {
	async fn stat(&self, path: &str) -> TransportResult<Option<RemoteStat>> {
		match afs::metadata(path).await {
			Ok(meta) => {
				Ok(Some(RemoteStat { mtime: unix_secs(meta.modified()?), is_dir: meta.is_dir() }))
			}
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	async fn mkdir(&self, path: &str) -> TransportResult<()> {
		afs::create_dir(path).await?;
		Ok(())
	}

	async fn list(&self, path: &str) -> TransportResult<Option<Vec<String>>> {
		let mut entries = match afs::read_dir(path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e.into()),
		};

		let mut names = Vec::new();
		while let Some(entry) = entries.next_entry().await? {
			names.push(entry.file_name().to_string_lossy().into_owned());
		}
		Ok(Some(names))
	}

	async fn upload(&self, local: &Path, remote: &str, opts: TransferOptions) -> TransportResult<()> {
		copy_path(local.to_path_buf(), PathBuf::from(remote), opts).await
	}

	async fn download(
		&self,
		remote: &str,
		local: &Path,
		opts: TransferOptions,
	) -> TransportResult<()> {
		copy_path(PathBuf::from(remote), local.to_path_buf(), opts).await
	}

	async fn remove(&self, path: &str) -> TransportResult<()> {
		afs::remove_file(path).await?;
		Ok(())
	}

	async fn rmdir(&self, path: &str) -> TransportResult<()> {
		afs::remove_dir(path).await?;
		Ok(())
	}

	async fn setstat(&self, path: &str, attrs: PendingStat) -> TransportResult<()> {
		set_times(Path::new(path), attrs)?;
		Ok(())
	}

	fn endpoint(&self) -> String {
		"local".to_string()
	}
}

#[async_trait]
impl CommandRunner for LocalTransport {
	async fn exec(&self, command: &str) -> TransportResult<String> {
		let output = tokio::process::Command::new("sh").arg("-c").arg(command).output().await?;
		if !output.status.success() {
			return Err(TransportError::CommandFailed {
				command: command.to_string(),
				status: output.status.code(),
				stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
			});
		}
		Ok(String::from_utf8_lossy(&output.stdout).into_owned())
	}
}

/// Apply a pending stat to a local path
pub fn set_times(path: &Path, attrs: PendingStat) -> io::Result<()> {
	let mtime = FileTime::from_unix_time(attrs.mtime, 0);
	let atime = FileTime::from_unix_time(attrs.atime.unwrap_or(attrs.mtime), 0);
	filetime::set_file_times(path, atime, mtime)
}

fn copy_path(
	from: PathBuf,
	to: PathBuf,
	opts: TransferOptions,
) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send>> {
	Box::pin(async move {
		let meta = afs::metadata(&from).await?;

		if meta.is_dir() {
			if !opts.recursive {
				return Err(TransportError::Remote {
					path: from.display().to_string(),
					message: "is a directory (recursive transfer required)".to_string(),
				});
			}
			afs::create_dir_all(&to).await?;
			let mut entries = afs::read_dir(&from).await?;
			while let Some(entry) = entries.next_entry().await? {
				copy_path(entry.path(), to.join(entry.file_name()), opts).await?;
			}
			return Ok(());
		}

		if let Some(parent) = to.parent() {
			afs::create_dir_all(parent).await?;
		}
		afs::copy(&from, &to).await?;

		if opts.preserve_times {
			let mtime = unix_secs(meta.modified()?);
			set_times(&to, PendingStat { mtime, atime: None })?;
		}
		Ok(())
	})
}

/// Connector handing out local sessions
#[derive(Debug, Clone, Default)]
pub struct LocalConnector;

#[async_trait]
impl Connector for LocalConnector {
	async fn open(&self) -> Result<Arc<dyn Transport>, MirrorError> {
		Ok(Arc::new(LocalTransport::new()))
	}

	fn endpoint(&self) -> String {
		"local".to_string()
	}
}


// vim: ts=4
