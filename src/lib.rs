//! # guestmirror - Host/Guest Directory Mirroring
//!
//! guestmirror keeps a host directory and its counterpart inside a guest
//! (a VM reachable over SSH, or any locally mounted path) consistent in both
//! directions. The newer modification time wins, and removals reported by the
//! watcher are mirrored to the other side.
//!
//! ## One-off synchronization
//!
//! ```rust,ignore
//! use guestmirror::connection::Connection;
//! use guestmirror::sync::{SyncPaths, TreeSynchronizer};
//! use guestmirror::transport::LocalConnector;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), guestmirror::MirrorError> {
//!     let conn = Arc::new(Connection::new(Arc::new(LocalConnector), Duration::from_millis(100)));
//!     let paths = SyncPaths::new("./project", "/mnt/guest/project", conn.clone());
//!     TreeSynchronizer::new(paths).execute("/").await?;
//!     conn.finish_transfers().await
//! }
//! ```
//!
//! ## Live mirroring
//!
//! ```rust,ignore
//! use guestmirror::orchestrator::Orchestrator;
//! use guestmirror::watcher::NotifyWatcher;
//!
//! let handle = Orchestrator::new(conn, Arc::new(NotifyWatcher)).start(&config.folders).await?;
//! guestmirror::utils::wait_for_shutdown().await;
//! handle.shutdown().await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod exclusion;
pub mod logging;
pub mod orchestrator;
pub mod rsync;
pub mod sync;
pub mod transport;
pub mod types;
pub mod utils;
pub mod watcher;

// Re-export commonly used types
pub use config::{Config, MirrorSpec};
pub use connection::{Connection, TransferStats};
pub use error::{MirrorError, TransportError};
pub use exclusion::ExcludeMatcher;
pub use orchestrator::{MonitorHandle, Orchestrator};
pub use types::{ChangeEvent, ChangeKind, Side};

// vim: ts=4
