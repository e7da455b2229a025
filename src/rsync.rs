//! rsync on the guest, copying from the guest-side mount of the host folder
//! into the mirror

use std::path::PathBuf;

use crate::config::MirrorSpec;
use crate::error::MirrorError;
use crate::logging::*;
use crate::transport::{shell_quote, CommandRunner};
use crate::types::{guest_join, normalize_relative};

#[derive(Debug, Clone)]
pub struct RsyncCommand {
	/// Where the host folder is mounted inside the guest
	pub share_root: String,

	/// Host folder, consulted to tell directories from files
	pub host_root: PathBuf,

	pub guest_root: String,
	pub delete: bool,
	pub excludes: Vec<String>,
}

impl RsyncCommand {
	/// Builder for a mirror with a guest share, `None` otherwise
	pub fn for_spec(spec: &MirrorSpec) -> Option<Self> {
		let share_root = spec.guest_share_path.clone()?;
		Some(RsyncCommand {
			share_root,
			host_root: spec.host_path.clone(),
			guest_root: spec.guest_path.clone(),
			delete: spec.delete,
			excludes: spec.effective_excludes(),
		})
	}

	/// Command line updating `relative` (the whole mirror when empty)
	pub async fn command_for(&self, relative: &str) -> String {
		let relative = normalize_relative(relative);

		let mut source = format!("{}/{}", self.share_root.trim_end_matches('/'), relative);
		let mut dest = format!("{}/{}", self.guest_root.trim_end_matches('/'), relative);
		if !relative.is_empty() && self.is_host_dir(&relative).await {
			source.push('/');
			dest.push('/');
		}

		let mut args = vec!["rsync -av".to_string()];
		if self.delete {
			args.push("--del".to_string());
		}
		for exclude in &self.excludes {
			args.push(format!("--exclude {}", shell_quote(exclude)));
		}
		args.push(shell_quote(&source));
		args.push(shell_quote(&dest));
		args.join(" ")
	}

	/// Command removing `relative` from the mirror
	pub fn remove_command(&self, relative: &str) -> String {
		format!("rm -rf {}", shell_quote(&guest_join(&self.guest_root, relative)))
	}

	pub async fn run(&self, runner: &dyn CommandRunner, relative: &str) -> Result<(), MirrorError> {
		let command = self.command_for(relative).await;
		debug!("{}", command);
		let output = runner.exec(&command).await?;
		for line in output.lines().filter(|l| !l.trim().is_empty()) {
			debug!("rsync: {}", line);
		}
		info!(">> {}", display_relative(relative));
		Ok(())
	}

	pub async fn remove(&self, runner: &dyn CommandRunner, relative: &str) -> Result<(), MirrorError> {
		runner.exec(&self.remove_command(relative)).await?;
		warn!("XX {}", guest_join(&self.guest_root, relative));
		Ok(())
	}

	async fn is_host_dir(&self, relative: &str) -> bool {
		tokio::fs::metadata(self.host_root.join(relative)).await.map(|m| m.is_dir()).unwrap_or(false)
	}
}

fn display_relative(relative: &str) -> String {
	let relative = normalize_relative(relative);
	if relative.is_empty() {
		"/".to_string()
	} else {
		relative
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	fn command(host: &TempDir) -> RsyncCommand {
		RsyncCommand {
			share_root: "/vagrant".to_string(),
			host_root: host.path().to_path_buf(),
			guest_root: "/var/vagrant".to_string(),
			delete: false,
			excludes: vec![],
		}
	}

	#[tokio::test]
	async fn test_root_copies_contents() {
		let host = TempDir::new().unwrap();
		let rsync = command(&host);
		assert_eq!(rsync.command_for("").await, "rsync -av '/vagrant/' '/var/vagrant/'");
		assert_eq!(rsync.command_for("/").await, "rsync -av '/vagrant/' '/var/vagrant/'");
	}

	#[tokio::test]
	async fn test_file_and_directory_paths() {
		let host = TempDir::new().unwrap();
		fs::create_dir(host.path().join("dir")).unwrap();
		let rsync = command(&host);

		assert_eq!(rsync.command_for("file").await, "rsync -av '/vagrant/file' '/var/vagrant/file'");
		assert_eq!(rsync.command_for("dir").await, "rsync -av '/vagrant/dir/' '/var/vagrant/dir/'");
	}

	#[tokio::test]
	async fn test_delete_and_excludes() {
		let host = TempDir::new().unwrap();
		let mut rsync = command(&host);
		rsync.excludes = vec!["/.git".to_string(), "cache".to_string()];
		assert_eq!(
			rsync.command_for("file").await,
			"rsync -av --exclude '/.git' --exclude 'cache' '/vagrant/file' '/var/vagrant/file'"
		);

		rsync.excludes.clear();
		rsync.delete = true;
		assert_eq!(
			rsync.command_for("file").await,
			"rsync -av --del '/vagrant/file' '/var/vagrant/file'"
		);
	}

	#[test]
	fn test_remove_command() {
		let host = TempDir::new().unwrap();
		assert_eq!(command(&host).remove_command("gone"), "rm -rf '/var/vagrant/gone'");
	}

	#[test]
	fn test_only_mirrors_with_share_get_rsync() {
		let mut spec = MirrorSpec::new("/h", "/var/vagrant");
		assert!(RsyncCommand::for_spec(&spec).is_none());
		spec.guest_share_path = Some("/vagrant".to_string());
		spec.symlinks = vec!["logs".to_string()];
		let rsync = RsyncCommand::for_spec(&spec).unwrap();
		assert_eq!(rsync.excludes, vec!["logs".to_string()]);
	}
}

// vim: ts=4
