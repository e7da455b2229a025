//! Transport over the system SSH client
//!
//! Every operation is a short `ssh`/`scp` invocation multiplexed over one
//! ControlMaster socket, so the TCP session and authentication are set up
//! once per connection.

use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use super::{shell_quote, CommandRunner, Connector, TransferOptions, Transport, TransportResult};
use crate::config::SshConfig;
use crate::error::{MirrorError, TransportError};
use crate::logging::*;
use crate::types::{guest_parent, PendingStat, RemoteStat};

/// Exit status ssh uses for its own (connection level) failures
const SSH_CONNECTION_FAILURE: i32 = 255;

pub struct SshTransport {
	config: SshConfig,
	closed: AtomicBool,
}

impl SshTransport {
	pub fn new(config: SshConfig) -> Self {
		SshTransport { config, closed: AtomicBool::new(false) }
	}

	/// Options shared by ssh and scp
	fn common_options(&self) -> Vec<String> {
		let mut args = vec![];
		if let Some(key) = &self.config.identity_file {
			args.push("-i".to_string());
			args.push(key.display().to_string());
		}
		for opt in [
			"BatchMode=yes".to_string(),
			"StrictHostKeyChecking=no".to_string(),
			"UserKnownHostsFile=/dev/null".to_string(),
			"LogLevel=ERROR".to_string(),
			"ControlMaster=auto".to_string(),
			"ControlPath=/tmp/guestmirror-%C".to_string(),
			"ControlPersist=60".to_string(),
			format!("ConnectTimeout={}", self.config.connection_timeout),
		]
		.iter()
		{
			args.push("-o".to_string());
			args.push(opt.clone());
		}
		args
	}

	fn remote_spec(&self, path: &str) -> String {
		format!("{}:{}", self.config.destination(), path)
	}

	async fn ssh(&self, command: &str) -> TransportResult<Output> {
		debug!("ssh {}: {}", self.config.destination(), command);
		let output = Command::new(&self.config.ssh_command)
			.args(self.common_options())
			.arg("-p")
			.arg(self.config.port.to_string())
			.arg(self.config.destination())
			.arg(command)
			.stdin(Stdio::null())
			.output()
			.await?;
		self.check_connection(&output)?;
		Ok(output)
	}

	async fn ssh_checked(&self, command: &str) -> TransportResult<String> {
		let output = self.ssh(command).await?;
		if !output.status.success() {
			return Err(command_failed(command, &output));
		}
		Ok(String::from_utf8_lossy(&output.stdout).into_owned())
	}

	async fn scp(&self, from: &str, to: &str, opts: TransferOptions) -> TransportResult<()> {
		let mut cmd = Command::new(&self.config.scp_command);
		cmd.args(self.common_options()).arg("-q").arg("-P").arg(self.config.port.to_string());
		if opts.recursive {
			cmd.arg("-r");
		}
		if opts.preserve_times {
			cmd.arg("-p");
		}
		let output = cmd.arg(from).arg(to).stdin(Stdio::null()).output().await?;
		self.check_connection(&output)?;
		if !output.status.success() {
			return Err(command_failed(&format!("scp {} {}", from, to), &output));
		}
		Ok(())
	}

	fn check_connection(&self, output: &Output) -> TransportResult<()> {
		if output.status.code() == Some(SSH_CONNECTION_FAILURE) {
			self.closed.store(true, Ordering::SeqCst);
			warn!(
				"SSH session to {} lost: {}",
				self.config.destination(),
				String::from_utf8_lossy(&output.stderr).trim()
			);
			return Err(TransportError::Disconnected);
		}
		Ok(())
	}
}

fn command_failed(command: &str, output: &Output) -> TransportError {
	TransportError::CommandFailed {
		command: command.to_string(),
		status: output.status.code(),
		stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
	}
}

fn is_not_found(output: &Output) -> bool {
	String::from_utf8_lossy(&output.stderr).contains("No such file or directory")
}

/// Parse `stat -c '%Y %F'` output
fn parse_stat(line: &str) -> Option<RemoteStat> {
	let mut parts = line.trim().splitn(2, ' ');
	let mtime = parts.next()?.parse::<i64>().ok()?;
	let kind = parts.next().unwrap_or("");
	Some(RemoteStat { mtime, is_dir: kind == "directory" })
}

#[async_trait]
impl Transport for SshTransport {
	async fn stat(&self, path: &str) -> TransportResult<Option<RemoteStat>> {
		let command = format!("stat -c '%Y %F' {}", shell_quote(path));
		let output = self.ssh(&command).await?;
		if !output.status.success() {
			if is_not_found(&output) {
				return Ok(None);
			}
			return Err(command_failed(&command, &output));
		}
		let stdout = String::from_utf8_lossy(&output.stdout);
		parse_stat(&stdout).map(Some).ok_or_else(|| TransportError::Remote {
			path: path.to_string(),
			message: format!("unexpected stat output '{}'", stdout.trim()),
		})
	}

	async fn mkdir(&self, path: &str) -> TransportResult<()> {
		self.ssh_checked(&format!("mkdir {}", shell_quote(path))).await?;
		Ok(())
	}

	async fn list(&self, path: &str) -> TransportResult<Option<Vec<String>>> {
		let command = format!("ls -A1 {}", shell_quote(path));
		let output = self.ssh(&command).await?;
		if !output.status.success() {
			if is_not_found(&output) {
				return Ok(None);
			}
			return Err(command_failed(&command, &output));
		}
		Ok(Some(
			String::from_utf8_lossy(&output.stdout)
				.lines()
				.filter(|l| !l.is_empty())
				.map(str::to_string)
				.collect(),
		))
	}

	async fn upload(&self, local: &Path, remote: &str, opts: TransferOptions) -> TransportResult<()> {
		if let Some(parent) = guest_parent(remote) {
			self.ssh_checked(&format!("mkdir -p {}", shell_quote(parent))).await?;
		}
		self.scp(&local.display().to_string(), &self.remote_spec(remote), opts).await
	}

	async fn download(
		&self,
		remote: &str,
		local: &Path,
		opts: TransferOptions,
	) -> TransportResult<()> {
		if let Some(parent) = local.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		self.scp(&self.remote_spec(remote), &local.display().to_string(), opts).await
	}

	async fn remove(&self, path: &str) -> TransportResult<()> {
		self.ssh_checked(&format!("rm -f {}", shell_quote(path))).await?;
		Ok(())
	}

	async fn rmdir(&self, path: &str) -> TransportResult<()> {
		self.ssh_checked(&format!("rmdir {}", shell_quote(path))).await?;
		Ok(())
	}

	async fn setstat(&self, path: &str, attrs: PendingStat) -> TransportResult<()> {
		let quoted = shell_quote(path);
		let mut command = format!("touch -m -d @{} {}", attrs.mtime, quoted);
		if let Some(atime) = attrs.atime {
			command.push_str(&format!(" && touch -a -d @{} {}", atime, quoted));
		}
		self.ssh_checked(&command).await?;
		Ok(())
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	fn endpoint(&self) -> String {
		format!("{}:{}", self.config.destination(), self.config.port)
	}
}

#[async_trait]
impl CommandRunner for SshTransport {
	async fn exec(&self, command: &str) -> TransportResult<String> {
		if self.config.sudo {
			self.ssh_checked(&format!("sudo sh -c {}", shell_quote(command))).await
		} else {
			self.ssh_checked(command).await
		}
	}
}

/// Opens SSH sessions, retrying as configured
pub struct SshConnector {
	config: SshConfig,
}

impl SshConnector {
	pub fn new(config: SshConfig) -> Self {
		SshConnector { config }
	}
}

#[async_trait]
impl Connector for SshConnector {
	async fn open(&self) -> Result<Arc<dyn Transport>, MirrorError> {
		let mut last_error = TransportError::Disconnected;

		for attempt in 0..=self.config.retry_count {
			if attempt > 0 {
				tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
			}

			let transport = SshTransport::new(self.config.clone());
			match transport.ssh_checked("true").await {
				Ok(_) => {
					info!("Connected to {}", transport.endpoint());
					return Ok(Arc::new(transport));
				}
				Err(e) => {
					warn!(
						"Connection attempt {}/{} to {} failed: {}",
						attempt + 1,
						self.config.retry_count + 1,
						self.endpoint(),
						e
					);
					last_error = e;
				}
			}
		}

		Err(MirrorError::TransportUnavailable {
			endpoint: self.endpoint(),
			source: Box::new(last_error),
		})
	}

	fn endpoint(&self) -> String {
		format!("{}:{}", self.config.destination(), self.config.port)
	}
}


// vim: ts=4
