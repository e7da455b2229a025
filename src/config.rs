//! Configuration for guestmirror
//!
//! Loaded from a TOML file (or JSON5 for `.json` / `.json5` files):
//!
//! ```toml
//! localStatDelayMs = 100
//!
//! [transport]
//! kind = "ssh"
//!
//! [ssh]
//! host = "127.0.0.1"
//! port = 2222
//! user = "vagrant"
//! identityFile = "~/.vagrant.d/insecure_private_key"
//!
//! [[folders]]
//! hostPath = "."
//! guestPath = "/var/vagrant"
//! guestSharePath = "/vagrant"
//! delete = true
//! exclude = ["/.git", "cache"]
//! symlinks = ["logs"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::MirrorError;

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// How the guest side is reached
	pub transport: TransportConfig,

	/// SSH endpoint (used when `transport.kind = "ssh"`)
	pub ssh: SshConfig,

	/// Delay before stamping a just-downloaded host file (milliseconds)
	pub local_stat_delay_ms: u64,

	/// Command run for audible notifications instead of writing BEL
	pub beep_command: Option<String>,

	/// Mirrored folder pairs
	pub folders: Vec<MirrorSpec>,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			transport: TransportConfig::default(),
			ssh: SshConfig::default(),
			local_stat_delay_ms: 100,
			beep_command: None,
			folders: vec![],
		}
	}
}

impl Config {
	/// Load, resolve and validate a configuration file
	pub fn load(path: &Path) -> Result<Self, MirrorError> {
		let contents = std::fs::read_to_string(path).map_err(|e| MirrorError::InvalidConfig {
			message: format!("cannot read {}: {}", path.display(), e),
		})?;

		let is_json = matches!(
			path.extension().and_then(|e| e.to_str()),
			Some("json") | Some("json5")
		);

		let mut config: Config = if is_json {
			json5::from_str(&contents).map_err(|e| MirrorError::InvalidConfig {
				message: format!("{}: {}", path.display(), e),
			})?
		} else {
			toml::from_str(&contents).map_err(|e| MirrorError::InvalidConfig {
				message: format!("{}: {}", path.display(), e),
			})?
		};

		let base = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
		config.resolve_host_paths(base);
		config.validate()?;
		Ok(config)
	}

	/// Make relative host paths relative to `base` (the config file's directory)
	pub fn resolve_host_paths(&mut self, base: &Path) {
		for folder in &mut self.folders {
			if folder.host_path.is_relative() {
				let joined = base.join(&folder.host_path);
				folder.host_path = joined.canonicalize().unwrap_or(joined);
			}
		}
	}

	pub fn validate(&self) -> Result<(), MirrorError> {
		for (index, folder) in self.folders.iter().enumerate() {
			folder.validate().map_err(|message| MirrorError::InvalidConfig {
				message: format!("folder #{}: {}", index + 1, message),
			})?;
		}
		if self.transport.kind == TransportKind::Ssh && !self.folders.is_empty() {
			if self.ssh.host.is_empty() {
				return Err(MirrorError::InvalidConfig {
					message: "ssh.host is required for the ssh transport".to_string(),
				});
			}
		}
		Ok(())
	}

	pub fn local_stat_delay(&self) -> Duration {
		Duration::from_millis(self.local_stat_delay_ms)
	}
}

// ============================================================================
// MIRRORED FOLDERS
// ============================================================================

/// One mirrored folder pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MirrorSpec {
	/// Root of the mirror on the host
	pub host_path: PathBuf,

	/// Root of the mirror on the guest
	pub guest_path: String,

	/// Guest-side mount of the host folder; enables bulk copies with rsync
	#[serde(default)]
	pub guest_share_path: Option<String>,

	/// Pass `--del` to rsync so bulk copies also remove stale guest files
	#[serde(default)]
	pub delete: bool,

	/// Audible notification after each applied change
	#[serde(default)]
	pub beep: bool,

	/// Exclude patterns
	#[serde(default)]
	pub exclude: Vec<String>,

	/// Paths (relative to the root) materialized as guest symlinks into the share
	#[serde(default)]
	pub symlinks: Vec<String>,
}

impl MirrorSpec {
	pub fn new(host_path: impl Into<PathBuf>, guest_path: impl Into<String>) -> Self {
		MirrorSpec {
			host_path: host_path.into(),
			guest_path: guest_path.into(),
			guest_share_path: None,
			delete: false,
			beep: false,
			exclude: vec![],
			symlinks: vec![],
		}
	}

	/// Exclude patterns plus every symlinked path
	pub fn effective_excludes(&self) -> Vec<String> {
		let mut patterns = self.exclude.clone();
		for link in &self.symlinks {
			if !patterns.contains(link) {
				patterns.push(link.clone());
			}
		}
		patterns
	}

	/// Short label for log lines
	pub fn label(&self) -> String {
		format!("{} => {}", self.host_path.display(), self.guest_path)
	}

	fn validate(&self) -> Result<(), String> {
		if self.host_path.as_os_str().is_empty() {
			return Err("cannot mirror an empty host path".to_string());
		}
		if self.guest_path.trim().is_empty() {
			return Err("cannot mirror an empty guest path".to_string());
		}
		if !self.symlinks.is_empty() && self.guest_share_path.is_none() {
			return Err("symlinks require guestSharePath".to_string());
		}
		if self.symlinks.iter().any(|s| s.trim_matches('/').is_empty()) {
			return Err("symlink paths cannot be empty".to_string());
		}
		Ok(())
	}
}

// ============================================================================
// TRANSPORT CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
	#[default]
	Ssh,
	Local,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransportConfig {
	pub kind: TransportKind,
}

/// SSH/Remote connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SshConfig {
	pub host: String,

	pub port: u16,

	pub user: Option<String>,

	/// Private key used for authentication
	pub identity_file: Option<PathBuf>,

	/// SSH client binary
	pub ssh_command: String,

	/// SCP client binary
	pub scp_command: String,

	/// Number of retries for failed connections
	pub retry_count: u32,

	/// Delay between retries in milliseconds
	pub retry_delay_ms: u64,

	/// Connection timeout in seconds
	pub connection_timeout: u64,

	/// Run guest commands through sudo
	pub sudo: bool,
}

impl Default for SshConfig {
	fn default() -> Self {
		SshConfig {
			host: String::new(),
			port: 22,
			user: None,
			identity_file: None,
			ssh_command: "ssh".to_string(),
			scp_command: "scp".to_string(),
			retry_count: 3,
			retry_delay_ms: 1000,
			connection_timeout: 30,
			sudo: true,
		}
	}
}

impl SshConfig {
	/// `user@host` or just `host`
	pub fn destination(&self) -> String {
		match &self.user {
			Some(user) => format!("{}@{}", user, self.host),
			None => self.host.clone(),
		}
	}
}


// vim: ts=4
