/// Configuration files: formats, defaults and validation
use std::fs;
use tempfile::TempDir;

use guestmirror::config::{Config, TransportKind};
use guestmirror::error::MirrorError;

fn write_config(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
	let path = dir.path().join(name);
	fs::write(&path, contents).unwrap();
	path
}

#[test]
fn test_full_toml_config() {
	let tmp = TempDir::new().unwrap();
	fs::create_dir(tmp.path().join("www")).unwrap();
	let path = write_config(
		&tmp,
		"mirror.toml",
		r#"
localStatDelayMs = 250
beepCommand = "paplay bell.oga"

[ssh]
host = "127.0.0.1"
port = 2222
user = "vagrant"
identityFile = "/home/me/.vagrant.d/insecure_private_key"
sudo = false

[[folders]]
hostPath = "www"
guestPath = "/var/www"
guestSharePath = "/vagrant/www"
delete = true
beep = true
exclude = ["/.git", "*.swp"]
symlinks = ["storage/logs"]

[[folders]]
hostPath = "/srv/other"
guestPath = "/opt/other"
"#,
	);

	let config = Config::load(&path).unwrap();
	assert_eq!(config.transport.kind, TransportKind::Ssh);
	assert_eq!(config.local_stat_delay().as_millis(), 250);
	assert_eq!(config.beep_command.as_deref(), Some("paplay bell.oga"));
	assert_eq!(config.ssh.destination(), "vagrant@127.0.0.1");
	assert_eq!(config.ssh.port, 2222);
	assert!(!config.ssh.sudo);

	assert_eq!(config.folders.len(), 2);
	let www = &config.folders[0];
	assert!(www.host_path.is_absolute());
	assert_eq!(www.guest_share_path.as_deref(), Some("/vagrant/www"));
	assert_eq!(
		www.effective_excludes(),
		vec!["/.git".to_string(), "*.swp".to_string(), "storage/logs".to_string()]
	);

	let other = &config.folders[1];
	assert_eq!(other.host_path.to_str(), Some("/srv/other"));
	assert!(!other.delete);
	assert!(!other.beep);
	assert!(other.exclude.is_empty());
}

#[test]
fn test_missing_file_is_config_error() {
	let tmp = TempDir::new().unwrap();
	let result = Config::load(&tmp.path().join("nope.toml"));
	assert!(matches!(result, Err(MirrorError::InvalidConfig { .. })));
}

#[test]
fn test_malformed_toml_is_config_error() {
	let tmp = TempDir::new().unwrap();
	let path = write_config(&tmp, "broken.toml", "[[folders]\nhostPath = ");
	assert!(matches!(Config::load(&path), Err(MirrorError::InvalidConfig { .. })));
}

#[test]
fn test_symlinks_without_share_rejected() {
	let tmp = TempDir::new().unwrap();
	let path = write_config(
		&tmp,
		"mirror.json",
		r#"{
			"transport": { "kind": "local" },
			"folders": [{ "hostPath": "/h", "guestPath": "/g", "symlinks": ["logs"] }]
		}"#,
	);
	match Config::load(&path) {
		Err(MirrorError::InvalidConfig { message }) => assert!(message.contains("guestSharePath")),
		other => panic!("unexpected result: {:?}", other.map(|_| ())),
	}
}

#[test]
fn test_effective_config_serializes_to_json() {
	let tmp = TempDir::new().unwrap();
	let path = write_config(
		&tmp,
		"mirror.toml",
		"[transport]\nkind = \"local\"\n\n[[folders]]\nhostPath = \"/h\"\nguestPath = \"/g\"\n",
	);
	let config = Config::load(&path).unwrap();

	let json: serde_json::Value = serde_json::to_value(&config).unwrap();
	assert_eq!(json["transport"]["kind"], "local");
	assert_eq!(json["localStatDelayMs"], 100);
	assert_eq!(json["folders"][0]["guestPath"], "/g");
}

// vim: ts=4
