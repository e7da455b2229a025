use clap::{Arg, ArgAction, Command};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use guestmirror::config::{Config, TransportKind};
use guestmirror::connection::Connection;
use guestmirror::error::MirrorError;
use guestmirror::exclusion::ExcludeMatcher;
use guestmirror::logging::*;
use guestmirror::orchestrator::{materialize_symlinks, Orchestrator};
use guestmirror::sync::{SyncPaths, TreeSynchronizer};
use guestmirror::transport::{
	CommandRunner, Connector, LocalConnector, LocalTransport, SshConnector, SshTransport,
};
use guestmirror::watcher::NotifyWatcher;

const DEFAULT_CONFIG: &str = "mirror.toml";

///////////////////////
// Utility functions //
///////////////////////

/// Session factory plus command runner for the configured transport
fn build_transport(config: &Config) -> (Arc<dyn Connector>, Arc<dyn CommandRunner>) {
	match config.transport.kind {
		TransportKind::Ssh => (
			Arc::new(SshConnector::new(config.ssh.clone())),
			Arc::new(SshTransport::new(config.ssh.clone())),
		),
		TransportKind::Local => (Arc::new(LocalConnector), Arc::new(LocalTransport::new())),
	}
}

/// Reconcile every folder pair once
async fn sync_all(
	config: &Config,
	connection: &Arc<Connection>,
	runner: Option<&dyn CommandRunner>,
) -> Result<(), MirrorError> {
	for folder in &config.folders {
		info!("Synchronising {}", folder.label());

		if let Some(runner) = runner {
			if !folder.symlinks.is_empty() {
				materialize_symlinks(folder, runner).await?;
			}
		}

		let excludes = Arc::new(ExcludeMatcher::new(folder.effective_excludes()));
		excludes.validate()?;

		let paths = SyncPaths::new(
			folder.host_path.clone(),
			folder.guest_path.clone(),
			connection.clone(),
		);
		TreeSynchronizer::new(paths).with_excludes(excludes).execute("/").await?;
	}

	connection.finish_transfers().await?;

	let stats = connection.stats();
	info!(
		"{} uploads, {} downloads, {} deletions",
		stats.uploads, stats.downloads, stats.deletes
	);
	info!("Completed directory synchronisation");
	Ok(())
}

async fn monitor(
	config: &Config,
	connection: Arc<Connection>,
	runner: Arc<dyn CommandRunner>,
	initial_sync: bool,
) -> Result<(), MirrorError> {
	if initial_sync {
		sync_all(config, &connection, None).await?;
	}

	let orchestrator = Orchestrator::new(connection.clone(), Arc::new(NotifyWatcher))
		.with_runner(runner)
		.with_beep_command(config.beep_command.clone());
	let mut handle = orchestrator.start(&config.folders).await?;

	tokio::select! {
		_ = guestmirror::utils::wait_for_shutdown() => {}
		stopped = handle.stopped() => {
			if let Some(label) = stopped {
				warn!("Mirror worker for {} stopped, shutting down", label);
			}
		}
	}
	info!("Stopping {} mirror workers", handle.len());

	let result = handle.shutdown().await;
	connection.finish_transfers().await?;
	connection.close().await;
	result?;

	info!("Completed directory synchronisation");
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let matches = Command::new("guestmirror")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Mirror host directories into a guest machine")
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.default_value(DEFAULT_CONFIG)
				.help("Configuration file (TOML, or JSON5 for .json/.json5)"),
		)
		.subcommand(Command::new("sync").about("Synchronise every folder pair once and exit"))
		.subcommand(
			Command::new("monitor")
				.about("Synchronise, then mirror changes until interrupted (default)")
				.arg(
					Arg::new("skip-sync")
						.long("skip-sync")
						.action(ArgAction::SetTrue)
						.help("Start monitoring without the initial full synchronisation"),
				),
		)
		.subcommand(Command::new("config").about("Print the effective configuration as JSON"))
		.get_matches();

	guestmirror::logging::init_tracing();

	let config_path = matches
		.get_one::<String>("config")
		.map(PathBuf::from)
		.ok_or("--config: file argument required")?;
	let config = Config::load(&config_path)?;

	if matches.subcommand_matches("config").is_some() {
		println!("{}", serde_json::to_string_pretty(&config)?);
		return Ok(());
	}

	if config.folders.is_empty() {
		info!("No mirrored folders configured in {}", config_path.display());
		return Ok(());
	}

	let (connector, runner) = build_transport(&config);
	let connection = Arc::new(Connection::new(connector, config.local_stat_delay()));

	match matches.subcommand() {
		Some(("sync", _)) => sync_all(&config, &connection, Some(runner.as_ref())).await?,
		Some(("monitor", sub_matches)) => {
			let initial_sync = !sub_matches.get_flag("skip-sync");
			monitor(&config, connection, runner, initial_sync).await?
		}
		_ => monitor(&config, connection, runner, true).await?,
	}

	Ok(())
}

// vim: ts=4
