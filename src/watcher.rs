//! Filesystem change watching for host roots

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher as _};
use std::any::Any;
use std::path::{Path, PathBuf};

use crate::error::MirrorError;
use crate::logging::*;
use crate::types::normalize_relative;

/// Receives `(modified, added, removed)` paths relative to the watched root
pub type ChangeCallback = Box<dyn Fn(Vec<String>, Vec<String>, Vec<String>) + Send + Sync>;

/// Keeps a watch alive; dropping it stops the watch
pub struct WatchHandle {
	_inner: Box<dyn Any + Send>,
}

impl WatchHandle {
	pub fn new<T: Any + Send>(inner: T) -> Self {
		WatchHandle { _inner: Box::new(inner) }
	}

	/// Handle for a watcher that holds no resources
	pub fn noop() -> Self {
		WatchHandle::new(())
	}
}

pub trait Watcher: Send + Sync {
	/// Start watching `root` recursively, reporting batches to `on_change`
	fn watch(&self, root: &Path, on_change: ChangeCallback) -> Result<WatchHandle, MirrorError>;
}

/// Watcher backed by the platform's native notification API
#[derive(Debug, Clone, Default)]
pub struct NotifyWatcher;

impl Watcher for NotifyWatcher {
	fn watch(&self, root: &Path, on_change: ChangeCallback) -> Result<WatchHandle, MirrorError> {
		let roots = Roots::new(root);

		let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
			match result {
				Ok(event) => {
					let batch = roots.classify(event);
					if !batch.is_empty() {
						on_change(batch.modified, batch.added, batch.removed);
					}
				}
				Err(e) => error!("Watcher error: {}", e),
			}
		})
		.map_err(|e| MirrorError::Other { message: format!("cannot create watcher: {}", e) })?;

		watcher.watch(root, RecursiveMode::Recursive).map_err(|e| MirrorError::Other {
			message: format!("cannot watch {}: {}", root.display(), e),
		})?;

		info!("Watching {}", root.display());
		Ok(WatchHandle::new(watcher))
	}
}

/// The watched root as given and canonicalized (backends may report either)
struct Roots {
	given: PathBuf,
	canonical: Option<PathBuf>,
}

#[derive(Debug, Default, PartialEq)]
struct Batch {
	modified: Vec<String>,
	added: Vec<String>,
	removed: Vec<String>,
}

impl Batch {
	fn is_empty(&self) -> bool {
		self.modified.is_empty() && self.added.is_empty() && self.removed.is_empty()
	}
}

impl Roots {
	fn new(root: &Path) -> Self {
		Roots { given: root.to_path_buf(), canonical: root.canonicalize().ok() }
	}

	fn relative(&self, path: &Path) -> Option<String> {
		let stripped = path
			.strip_prefix(&self.given)
			.ok()
			.or_else(|| self.canonical.as_ref().and_then(|c| path.strip_prefix(c).ok()))?;
		let relative = normalize_relative(&stripped.to_string_lossy());
		if relative.is_empty() {
			None
		} else {
			Some(relative)
		}
	}

	fn classify(&self, event: Event) -> Batch {
		let mut batch = Batch::default();
		let paths: Vec<String> = event.paths.iter().filter_map(|p| self.relative(p)).collect();

		match event.kind {
			EventKind::Create(_) => batch.added = paths,
			EventKind::Remove(_) => batch.removed = paths,
			EventKind::Modify(ModifyKind::Name(RenameMode::From)) => batch.removed = paths,
			EventKind::Modify(ModifyKind::Name(RenameMode::To)) => batch.added = paths,
			EventKind::Modify(ModifyKind::Name(_)) if event.paths.len() == 2 => {
				if let Some(from) = self.relative(&event.paths[0]) {
					batch.removed.push(from);
				}
				if let Some(to) = self.relative(&event.paths[1]) {
					batch.added.push(to);
				}
			}
			EventKind::Modify(ModifyKind::Name(_)) => {
				// Direction unknown: let the existence check downstream decide
				batch.removed = paths;
			}
			EventKind::Modify(_) => batch.modified = paths,
			EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
		}
		batch
	}
}


// vim: ts=4
