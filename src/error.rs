//! Error types for mirroring operations

use std::error::Error;
use std::fmt;
use std::io;

/// Main error type for mirror operations
#[derive(Debug)]
pub enum MirrorError {
	/// The transport session could not be established or re-established
	TransportUnavailable { endpoint: String, source: Box<dyn Error + Send + Sync> },

	/// A file was expected on at least one side but exists on neither
	BothSidesMissing { path: String },

	/// An exclude pattern could not be compiled
	ExcludePatternInvalid { pattern: String, message: String },

	/// A path is a directory on one side and a plain file on the other
	TypeConflict { path: String },

	/// Error reported by the transport for a single operation
	Transport(TransportError),

	/// Local I/O error
	Io(io::Error),

	/// Invalid configuration
	InvalidConfig { message: String },

	/// Unexpected failure inside a folder worker
	Worker { folder: String, source: Box<MirrorError> },

	/// Generic error message
	Other { message: String },
}

impl MirrorError {
	/// Whether this error ends the worker that hit it.
	///
	/// Everything else is a per-file failure: logged, then processing continues.
	pub fn is_fatal(&self) -> bool {
		match self {
			MirrorError::TransportUnavailable { .. } | MirrorError::ExcludePatternInvalid { .. } => {
				true
			}
			MirrorError::Worker { source, .. } => source.is_fatal(),
			_ => false,
		}
	}

	/// Wrap an error escaping a folder worker
	pub fn in_worker(folder: impl Into<String>, source: MirrorError) -> Self {
		match source {
			already @ MirrorError::Worker { .. } => already,
			other => MirrorError::Worker { folder: folder.into(), source: Box::new(other) },
		}
	}
}

impl fmt::Display for MirrorError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			MirrorError::TransportUnavailable { endpoint, source } => {
				write!(f, "Cannot connect to {}: {}", endpoint, source)
			}
			MirrorError::BothSidesMissing { path } => {
				write!(
					f,
					"{} was not found on either the host or guest filesystem - cannot sync",
					path
				)
			}
			MirrorError::ExcludePatternInvalid { pattern, message } => {
				write!(f, "Invalid exclude pattern '{}': {}", pattern, message)
			}
			MirrorError::TypeConflict { path } => {
				write!(f, "{} is a directory on one side and a file on the other", path)
			}
			MirrorError::Transport(e) => write!(f, "Transport error: {}", e),
			MirrorError::Io(e) => write!(f, "I/O error: {}", e),
			MirrorError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			MirrorError::Worker { folder, source } => {
				write!(f, "Mirror worker for {} failed: {}", folder, source)
			}
			MirrorError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for MirrorError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			MirrorError::Transport(e) => Some(e),
			MirrorError::Io(e) => Some(e),
			MirrorError::Worker { source, .. } => Some(source.as_ref()),
			_ => None,
		}
	}
}

impl From<io::Error> for MirrorError {
	fn from(e: io::Error) -> Self {
		MirrorError::Io(e)
	}
}

impl From<TransportError> for MirrorError {
	fn from(e: TransportError) -> Self {
		MirrorError::Transport(e)
	}
}

impl From<String> for MirrorError {
	fn from(e: String) -> Self {
		MirrorError::Other { message: e }
	}
}

/// Errors raised by a transport for one remote operation
///
/// "Not found" is never an error here: stat and list return `None` instead.
#[derive(Debug)]
pub enum TransportError {
	/// I/O error while talking to the transport
	Io(io::Error),

	/// The remote side refused or failed the operation
	Remote { path: String, message: String },

	/// The underlying session is gone
	Disconnected,

	/// A remote command exited unsuccessfully
	CommandFailed { command: String, status: Option<i32>, stderr: String },
}

impl fmt::Display for TransportError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransportError::Io(e) => write!(f, "I/O error: {}", e),
			TransportError::Remote { path, message } => write!(f, "{}: {}", path, message),
			TransportError::Disconnected => write!(f, "Session disconnected"),
			TransportError::CommandFailed { command, status, stderr } => match status {
				Some(code) => write!(f, "'{}' exited with {}: {}", command, code, stderr.trim()),
				None => write!(f, "'{}' was terminated: {}", command, stderr.trim()),
			},
		}
	}
}

impl Error for TransportError {}

impl From<io::Error> for TransportError {
	fn from(e: io::Error) -> Self {
		TransportError::Io(e)
	}
}


// vim: ts=4
