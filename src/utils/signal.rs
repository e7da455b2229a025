//! Termination signals

use crate::logging::*;

/// Resolve once the process is asked to stop (SIGINT, SIGTERM or Ctrl-C)
pub async fn wait_for_shutdown() {
	#[cfg(unix)]
	{
		use tokio::signal::unix::{signal, SignalKind};

		let mut sigterm = match signal(SignalKind::terminate()) {
			Ok(stream) => stream,
			Err(e) => {
				warn!("Failed to setup SIGTERM handler: {}. Waiting for Ctrl-C only.", e);
				let _ = tokio::signal::ctrl_c().await;
				return;
			}
		};

		tokio::select! {
			_ = sigterm.recv() => debug!("Received SIGTERM, stopping..."),
			_ = tokio::signal::ctrl_c() => debug!("Received SIGINT, stopping..."),
		}
	}

	#[cfg(not(unix))]
	{
		if let Err(e) = tokio::signal::ctrl_c().await {
			warn!("Failed to listen for Ctrl-C: {}", e);
		}
	}
}

// vim: ts=4
