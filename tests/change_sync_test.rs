/// Change batches: transfer direction and deletion semantics
mod common;

use tempfile::TempDir;

use common::{path_str, read_file, recording_connection, write_file};
use guestmirror::sync::{ChangeSynchronizer, SyncPaths};
use guestmirror::types::Side;

fn strings(paths: &[&str]) -> Vec<String> {
	paths.iter().map(|p| p.to_string()).collect()
}

#[tokio::test]
async fn test_host_removal_missing_on_guest_deletes_nothing() {
	let host = TempDir::new().unwrap();
	let guest = TempDir::new().unwrap();

	let (conn, recorder) = recording_connection();
	let sync = ChangeSynchronizer::new(SyncPaths::new(host.path(), path_str(guest.path()), conn));
	sync.execute(Side::Host, &[], &[], &strings(&["never-there.txt"])).await.unwrap();

	assert_eq!(recorder.count("remove"), 0);
	assert_eq!(recorder.count("rmdir"), 0);
}

#[tokio::test]
async fn test_host_removal_deletes_guest_copy_once() {
	let host = TempDir::new().unwrap();
	let guest = TempDir::new().unwrap();
	write_file(guest.path(), "stale.txt", "old", 1000);

	let (conn, recorder) = recording_connection();
	let guest_root = path_str(guest.path());
	let sync = ChangeSynchronizer::new(SyncPaths::new(host.path(), guest_root.clone(), conn.clone()));
	sync.execute(Side::Host, &[], &[], &strings(&["stale.txt"])).await.unwrap();

	assert_eq!(recorder.paths("remove"), vec![format!("{}/stale.txt", guest_root)]);
	assert!(!guest.path().join("stale.txt").exists());
	assert_eq!(conn.stats().deletes, 1);
}

#[tokio::test]
async fn test_host_removal_of_directory_is_recursive_on_guest() {
	let host = TempDir::new().unwrap();
	let guest = TempDir::new().unwrap();
	write_file(guest.path(), "build/out/a.o", "a", 1000);
	write_file(guest.path(), "build/b.o", "b", 1000);

	let (conn, recorder) = recording_connection();
	let sync = ChangeSynchronizer::new(SyncPaths::new(host.path(), path_str(guest.path()), conn));
	sync.execute(Side::Host, &[], &[], &strings(&["build"])).await.unwrap();

	assert!(!guest.path().join("build").exists());
	assert_eq!(recorder.count("remove"), 2);
	assert_eq!(recorder.count("rmdir"), 2);
}

#[tokio::test]
async fn test_guest_removal_never_deletes_on_guest() {
	let host = TempDir::new().unwrap();
	let guest = TempDir::new().unwrap();
	write_file(host.path(), "shared.txt", "x", 1000);
	write_file(guest.path(), "shared.txt", "x", 1000);

	let (conn, recorder) = recording_connection();
	let sync = ChangeSynchronizer::new(SyncPaths::new(host.path(), path_str(guest.path()), conn));
	sync.execute(Side::Guest, &[], &[], &strings(&["shared.txt"])).await.unwrap();

	assert_eq!(recorder.count("remove"), 0);
	assert!(!host.path().join("shared.txt").exists());
	assert!(guest.path().join("shared.txt").exists());
}

#[tokio::test]
async fn test_batch_transfers_complete_before_return() {
	let host = TempDir::new().unwrap();
	let guest = TempDir::new().unwrap();
	write_file(host.path(), "added.txt", "new", 2000);
	write_file(host.path(), "edited.txt", "host edit", 3000);
	write_file(guest.path(), "edited.txt", "guest", 1000);
	write_file(guest.path(), "guest-edit.txt", "guest wins", 3000);
	write_file(host.path(), "guest-edit.txt", "host", 1000);

	let (conn, recorder) = recording_connection();
	let sync = ChangeSynchronizer::new(SyncPaths::new(host.path(), path_str(guest.path()), conn.clone()));
	sync.execute(
		Side::Host,
		&strings(&["added.txt"]),
		&strings(&["edited.txt", "guest-edit.txt"]),
		&[],
	)
	.await
	.unwrap();

	assert_eq!(conn.outstanding(), 0);
	assert_eq!(recorder.count("upload"), 2);
	assert_eq!(recorder.count("download"), 1);
	assert_eq!(read_file(guest.path(), "added.txt").as_deref(), Some("new"));
	assert_eq!(read_file(guest.path(), "edited.txt").as_deref(), Some("host edit"));
	assert_eq!(read_file(host.path(), "guest-edit.txt").as_deref(), Some("guest wins"));
}

#[tokio::test]
async fn test_missing_everywhere_is_logged_not_fatal() {
	let host = TempDir::new().unwrap();
	let guest = TempDir::new().unwrap();
	write_file(host.path(), "real.txt", "r", 1000);

	let (conn, recorder) = recording_connection();
	let sync = ChangeSynchronizer::new(SyncPaths::new(host.path(), path_str(guest.path()), conn));
	sync.execute(Side::Host, &strings(&["phantom.txt", "real.txt"]), &[], &[]).await.unwrap();

	assert_eq!(recorder.count("upload"), 1);
}

// vim: ts=4
