//! Live mirroring: one worker task per mirrored folder pair
//!
//! Each worker owns its change queue and the watch feeding it. Events are
//! applied one at a time in arrival order. A quit message makes the worker
//! drop its watch, drain whatever is already queued, and stop.

use futures::future::join_all;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::config::MirrorSpec;
use crate::connection::Connection;
use crate::error::MirrorError;
use crate::exclusion::ExcludeMatcher;
use crate::logging::*;
use crate::rsync::RsyncCommand;
use crate::sync::{ChangeSynchronizer, SyncPaths, TreeSynchronizer};
use crate::transport::{shell_quote, CommandRunner};
use crate::types::{
	guest_join, guest_parent, host_metadata, normalize_relative, ChangeEvent, ChangeKind, Side,
};
use crate::watcher::{WatchHandle, Watcher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
	Change(ChangeEvent),
	Quit,
}

pub struct Orchestrator {
	connection: Arc<Connection>,
	watcher: Arc<dyn Watcher>,
	runner: Option<Arc<dyn CommandRunner>>,
	beep_command: Option<String>,
}

impl Orchestrator {
	pub fn new(connection: Arc<Connection>, watcher: Arc<dyn Watcher>) -> Self {
		Orchestrator { connection, watcher, runner: None, beep_command: None }
	}

	/// Guest command execution, needed for rsync mirrors and symlinks
	pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
		self.runner = Some(runner);
		self
	}

	/// Command run instead of writing BEL when a mirror beeps
	pub fn with_beep_command(mut self, command: Option<String>) -> Self {
		self.beep_command = command;
		self
	}

	/// Start a worker for every folder pair
	///
	/// Fails if any pair cannot be set up; workers already started are shut
	/// down again before returning.
	pub async fn start(&self, specs: &[MirrorSpec]) -> Result<MonitorHandle, MirrorError> {
		let (exit_tx, exits) = unbounded_channel();
		let mut handle = MonitorHandle { workers: vec![], exits };

		for spec in specs {
			match self.start_worker(spec, exit_tx.clone()).await {
				Ok(slot) => handle.workers.push(slot),
				Err(e) => {
					let _ = handle.shutdown().await;
					return Err(MirrorError::in_worker(spec.label(), e));
				}
			}
		}

		info!("Beginning directory mirroring ({} folders)", handle.workers.len());
		Ok(handle)
	}

	async fn start_worker(
		&self,
		spec: &MirrorSpec,
		exited: UnboundedSender<String>,
	) -> Result<WorkerSlot, MirrorError> {
		let excludes = Arc::new(ExcludeMatcher::new(spec.effective_excludes()));
		excludes.validate()?;

		if !spec.symlinks.is_empty() {
			let runner = self.runner.as_ref().ok_or_else(|| MirrorError::InvalidConfig {
				message: format!("{}: symlinks need guest command execution", spec.label()),
			})?;
			materialize_symlinks(spec, runner.as_ref()).await?;
		}

		let (tx, rx) = unbounded_channel();
		let watch = self.watcher.watch(&spec.host_path, host_callback(tx.clone()))?;

		let paths =
			SyncPaths::new(spec.host_path.clone(), spec.guest_path.clone(), self.connection.clone());
		let rsync = match self.runner {
			Some(_) => RsyncCommand::for_spec(spec),
			None => None,
		};

		let worker = Worker {
			label: spec.label(),
			spec: spec.clone(),
			changes: ChangeSynchronizer::new(paths),
			excludes,
			rsync,
			runner: self.runner.clone(),
			beep_command: self.beep_command.clone(),
		};

		let label = worker.label.clone();
		let task = tokio::spawn({
			let label = label.clone();
			async move {
				let result = worker.run(rx, watch).await;
				if let Err(e) = &result {
					error!("{}", e);
				}
				let _ = exited.send(label);
				result
			}
		});
		Ok(WorkerSlot { label, tx, task })
	}
}

/// Watch callback pushing host-side changes onto a worker queue
fn host_callback(tx: UnboundedSender<WorkerMessage>) -> crate::watcher::ChangeCallback {
	Box::new(move |modified, added, removed| {
		let events = modified
			.into_iter()
			.map(|p| ChangeEvent::modified(Side::Host, p))
			.chain(added.into_iter().map(|p| ChangeEvent::added(Side::Host, p)))
			.chain(removed.into_iter().map(|p| ChangeEvent::removed(Side::Host, p)));
		for event in events {
			if tx.send(WorkerMessage::Change(event)).is_err() {
				warn!("Worker gone, dropping change notification");
				return;
			}
		}
	})
}

/// Create each symlinked path on the host and link it into the share on the guest
pub async fn materialize_symlinks(
	spec: &MirrorSpec,
	runner: &dyn CommandRunner,
) -> Result<(), MirrorError> {
	let share = spec.guest_share_path.as_deref().ok_or_else(|| MirrorError::InvalidConfig {
		message: format!("{}: symlinks require guestSharePath", spec.label()),
	})?;

	for link in &spec.symlinks {
		let relative = normalize_relative(link);
		tokio::fs::create_dir_all(spec.host_path.join(&relative)).await?;

		let guest = guest_join(&spec.guest_path, &relative);
		let parent = guest_parent(&guest).unwrap_or("/");
		let target = guest_join(share, &relative);
		let command = format!(
			"rm -f {} && mkdir -p {} && ln -s {} {}",
			shell_quote(&guest),
			shell_quote(parent),
			shell_quote(&target),
			shell_quote(&guest)
		);
		runner.exec(&command).await?;
		info!("Linked {} -> {}", guest, target);
	}
	Ok(())
}

// ============================================================================
// WORKER
// ============================================================================

struct Worker {
	label: String,
	spec: MirrorSpec,
	changes: ChangeSynchronizer,
	excludes: Arc<ExcludeMatcher>,
	rsync: Option<RsyncCommand>,
	runner: Option<Arc<dyn CommandRunner>>,
	beep_command: Option<String>,
}

impl Worker {
	async fn run(
		self,
		mut rx: UnboundedReceiver<WorkerMessage>,
		watch: WatchHandle,
	) -> Result<(), MirrorError> {
		debug!("Worker for {} started", self.label);
		let mut watch = Some(watch);

		while let Some(message) = rx.recv().await {
			match message {
				WorkerMessage::Change(event) => self.handle(event).await?,
				WorkerMessage::Quit => {
					watch.take();
					loop {
						match rx.try_recv() {
							Ok(WorkerMessage::Change(event)) => self.handle(event).await?,
							Ok(WorkerMessage::Quit) => continue,
							Err(_) => break,
						}
					}
					break;
				}
			}
		}

		debug!("Worker for {} stopped", self.label);
		Ok(())
	}

	/// Apply one event; only fatal errors end the worker
	async fn handle(&self, event: ChangeEvent) -> Result<(), MirrorError> {
		match self.apply(&event).await {
			Ok(true) => {
				if self.spec.beep {
					self.beep().await;
				}
				Ok(())
			}
			Ok(false) => Ok(()),
			Err(e) if e.is_fatal() => Err(MirrorError::in_worker(self.label.clone(), e)),
			Err(e) => {
				error!("Cannot mirror {} from {}: {}", event.path, event.source, e);
				Ok(())
			}
		}
	}

	/// Returns whether anything was applied
	async fn apply(&self, event: &ChangeEvent) -> Result<bool, MirrorError> {
		if event.path.is_empty() {
			return Ok(false);
		}
		if self.excludes.is_excluded(&event.path)? {
			debug!("Ignoring excluded {}", event.path);
			return Ok(false);
		}

		match event.kind {
			ChangeKind::Added | ChangeKind::Modified => {
				self.update(event.source, &event.path).await?;
				Ok(true)
			}
			ChangeKind::Removed => {
				// Some watch backends report removals for files that are still there
				if self.exists_on(event.source, &event.path).await? {
					debug!("{} still exists on {}, treating as modified", event.path, event.source);
					self.update(event.source, &event.path).await?;
					return Ok(true);
				}
				match self.bulk(event.source) {
					Some((rsync, runner)) => rsync.remove(runner, &event.path).await?,
					None => self.changes.remove_opposite(event.source, &event.path).await?,
				}
				Ok(true)
			}
		}
	}

	async fn update(&self, source: Side, relative: &str) -> Result<(), MirrorError> {
		if let Some((rsync, runner)) = self.bulk(source) {
			return rsync.run(runner, relative).await;
		}

		let paths = self.changes.paths();
		if self.is_dir_on(source, relative).await? {
			TreeSynchronizer::new(paths.clone())
				.with_excludes(self.excludes.clone())
				.execute(relative)
				.await?;
			return paths.connection.finish_transfers().await;
		}

		self.changes.execute(source, &[relative.to_string()], &[], &[]).await
	}

	/// rsync applies only to host-originated changes
	fn bulk(&self, source: Side) -> Option<(&RsyncCommand, &dyn CommandRunner)> {
		match (source, &self.rsync, &self.runner) {
			(Side::Host, Some(rsync), Some(runner)) => Some((rsync, runner.as_ref())),
			_ => None,
		}
	}

	async fn exists_on(&self, side: Side, relative: &str) -> Result<bool, MirrorError> {
		let paths = self.changes.paths();
		match side {
			Side::Host => Ok(host_metadata(&paths.host_path(relative)).await?.is_some()),
			Side::Guest => paths.connection.exists(&paths.guest_path(relative)).await,
		}
	}

	async fn is_dir_on(&self, side: Side, relative: &str) -> Result<bool, MirrorError> {
		let paths = self.changes.paths();
		match side {
			Side::Host => {
				Ok(host_metadata(&paths.host_path(relative)).await?.map_or(false, |m| m.is_dir()))
			}
			Side::Guest => paths.connection.is_directory(&paths.guest_path(relative)).await,
		}
	}

	async fn beep(&self) {
		match &self.beep_command {
			Some(command) => {
				let status =
					tokio::process::Command::new("sh").arg("-c").arg(command).status().await;
				if let Err(e) = status {
					warn!("Beep command failed: {}", e);
				}
			}
			None => {
				let mut stderr = std::io::stderr();
				let _ = stderr.write_all(b"\x07").and_then(|_| stderr.flush());
			}
		}
	}
}

// ============================================================================
// HANDLES
// ============================================================================

struct WorkerSlot {
	label: String,
	tx: UnboundedSender<WorkerMessage>,
	task: JoinHandle<Result<(), MirrorError>>,
}

/// Running workers, in the order of the folder list
pub struct MonitorHandle {
	workers: Vec<WorkerSlot>,
	exits: UnboundedReceiver<String>,
}

/// Feeds externally observed changes (usually guest-side) into one worker
#[derive(Clone)]
pub struct ChangeInjector {
	tx: UnboundedSender<WorkerMessage>,
}

impl ChangeInjector {
	pub fn send(&self, event: ChangeEvent) -> Result<(), MirrorError> {
		self.tx
			.send(WorkerMessage::Change(event))
			.map_err(|_| MirrorError::Other { message: "mirror worker has stopped".to_string() })
	}
}

impl MonitorHandle {
	pub fn len(&self) -> usize {
		self.workers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.workers.is_empty()
	}

	/// Wait until a worker stops on its own, returning its folder label
	///
	/// Workers only stop unasked after a fatal error, which they have already
	/// logged; `shutdown` returns that error. Yields `None` once every worker
	/// is gone.
	pub async fn stopped(&mut self) -> Option<String> {
		self.exits.recv().await
	}

	/// Injector for the worker of the `index`-th folder pair
	pub fn injector(&self, index: usize) -> Option<ChangeInjector> {
		self.workers.get(index).map(|w| ChangeInjector { tx: w.tx.clone() })
	}

	/// Tell every worker to quit and wait for all of them
	///
	/// Returns the first worker failure, after every worker has been joined.
	pub async fn shutdown(self) -> Result<(), MirrorError> {
		for worker in &self.workers {
			let _ = worker.tx.send(WorkerMessage::Quit);
		}

		let (labels, tasks): (Vec<_>, Vec<_>) =
			self.workers.into_iter().map(|w| (w.label, w.task)).unzip();

		let mut first = None;
		for (label, result) in labels.into_iter().zip(join_all(tasks).await) {
			let outcome = match result {
				Ok(outcome) => outcome,
				Err(e) => {
					let e = MirrorError::in_worker(
						label.clone(),
						MirrorError::Other { message: format!("worker task failed: {}", e) },
					);
					error!("{}", e);
					Err(e)
				}
			};
			if let Err(e) = outcome {
				if first.is_none() {
					first = Some(e);
				}
			}
		}

		match first {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}
}

// vim: ts=4
