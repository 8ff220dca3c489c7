// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Runtime control of the live interface.

use crate::keys::{WgPresharedKey, WgPublicKey};
use crate::tool::{run_wg, WgToolError, DEFAULT_WG_BINARY};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use std::collections::HashMap;
use std::io::Write;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Error, Debug)]
pub enum ControlError {
	#[error("wg tool error: {0}")]
	Tool(#[from] WgToolError),

	#[error("failed to stage preshared key: {0}")]
	PresharedKeyFile(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ControlError>;

#[async_trait]
pub trait InterfaceControl: Send + Sync {
	/// Adds or updates a peer on the running interface.
	async fn install_peer(
		&self,
		public_key: &WgPublicKey,
		preshared_key: &WgPresharedKey,
		allowed_ips: &IpNet,
	) -> Result<()>;

	/// Removes a peer from the running interface. Removing an unknown peer is
	/// not an error.
	async fn remove_peer(&self, public_key: &WgPublicKey) -> Result<()>;

	/// Most recent handshake per peer. Peers that never completed a handshake
	/// are absent.
	async fn last_handshakes(&self) -> Result<HashMap<WgPublicKey, DateTime<Utc>>>;

	async fn list_peers(&self) -> Result<Vec<WgPublicKey>>;
}

/// [`InterfaceControl`] backed by `wg set` / `wg show`.
#[derive(Debug, Clone)]
pub struct WgCommand {
	binary: String,
	interface: String,
}

impl WgCommand {
	pub fn new(interface: impl Into<String>) -> Self {
		Self::with_binary(DEFAULT_WG_BINARY, interface)
	}

	pub fn with_binary(binary: impl Into<String>, interface: impl Into<String>) -> Self {
		Self {
			binary: binary.into(),
			interface: interface.into(),
		}
	}

	pub fn interface(&self) -> &str {
		&self.interface
	}
}

#[async_trait]
impl InterfaceControl for WgCommand {
	#[instrument(skip(self, preshared_key), fields(interface = %self.interface, public_key = %public_key))]
	async fn install_peer(
		&self,
		public_key: &WgPublicKey,
		preshared_key: &WgPresharedKey,
		allowed_ips: &IpNet,
	) -> Result<()> {
		// `wg set` only reads preshared keys from a file. The temp file is
		// created 0600 and removed when `psk_file` drops.
		let mut psk_file = tempfile::NamedTempFile::new().map_err(ControlError::PresharedKeyFile)?;
		psk_file
			.write_all(preshared_key.to_base64().expose().as_bytes())
			.and_then(|_| psk_file.flush())
			.map_err(ControlError::PresharedKeyFile)?;

		let public_key = public_key.to_base64();
		let psk_path = psk_file.path().to_string_lossy().into_owned();
		let allowed_ips = allowed_ips.to_string();

		run_wg(
			&self.binary,
			&[
				"set",
				&self.interface,
				"peer",
				&public_key,
				"preshared-key",
				&psk_path,
				"allowed-ips",
				&allowed_ips,
			],
			None,
		)
		.await?;

		debug!(allowed_ips = %allowed_ips, "installed peer");
		Ok(())
	}

	#[instrument(skip(self), fields(interface = %self.interface, public_key = %public_key))]
	async fn remove_peer(&self, public_key: &WgPublicKey) -> Result<()> {
		let public_key = public_key.to_base64();
		run_wg(
			&self.binary,
			&["set", &self.interface, "peer", &public_key, "remove"],
			None,
		)
		.await?;
		debug!("removed peer");
		Ok(())
	}

	#[instrument(skip(self), fields(interface = %self.interface))]
	async fn last_handshakes(&self) -> Result<HashMap<WgPublicKey, DateTime<Utc>>> {
		let output = run_wg(
			&self.binary,
			&["show", &self.interface, "latest-handshakes"],
			None,
		)
		.await?;
		Ok(parse_latest_handshakes(&output))
	}

	#[instrument(skip(self), fields(interface = %self.interface))]
	async fn list_peers(&self) -> Result<Vec<WgPublicKey>> {
		let output = run_wg(&self.binary, &["show", &self.interface, "peers"], None).await?;
		Ok(parse_peers(&output))
	}
}

/// Parses `wg show <if> latest-handshakes` output: one `<key> <unix secs>` per
/// line. A timestamp of `0` means no handshake yet and is skipped.
pub fn parse_latest_handshakes(output: &str) -> HashMap<WgPublicKey, DateTime<Utc>> {
	let mut handshakes = HashMap::new();

	for line in output.lines() {
		let mut fields = line.split_whitespace();
		let (Some(key), Some(secs)) = (fields.next(), fields.next()) else {
			continue;
		};

		let key = match WgPublicKey::from_base64(key) {
			Ok(key) => key,
			Err(e) => {
				warn!(error = %e, "skipping handshake line with unparseable key");
				continue;
			}
		};

		let secs: i64 = match secs.parse() {
			Ok(secs) => secs,
			Err(_) => {
				warn!(public_key = %key, value = secs, "skipping unparseable handshake time");
				continue;
			}
		};

		if secs == 0 {
			continue;
		}

		if let Some(at) = DateTime::from_timestamp(secs, 0) {
			handshakes.insert(key, at);
		}
	}

	handshakes
}

fn parse_peers(output: &str) -> Vec<WgPublicKey> {
	output
		.lines()
		.filter_map(|line| WgPublicKey::from_base64(line).ok())
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	const PEER_A: &str = "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=";

	fn peer_b() -> WgPublicKey {
		WgPublicKey::from_bytes([5u8; 32])
	}

	#[test]
	fn parses_handshake_table() {
		let output = format!("{PEER_A}\t1700000000\n{}\t0\n", peer_b());
		let handshakes = parse_latest_handshakes(&output);

		assert_eq!(handshakes.len(), 1);
		let a = WgPublicKey::from_base64(PEER_A).unwrap();
		assert_eq!(handshakes[&a].timestamp(), 1_700_000_000);
		assert!(!handshakes.contains_key(&peer_b()));
	}

	#[test]
	fn tolerates_spaces_and_junk() {
		let output = format!("  {PEER_A}   1700000100  \ngarbage\nnotakey 12\n{PEER_A}\n");
		let handshakes = parse_latest_handshakes(&output);
		assert_eq!(handshakes.len(), 1);
	}

	#[test]
	fn empty_output_has_no_handshakes() {
		assert!(parse_latest_handshakes("").is_empty());
	}

	#[test]
	fn parses_peer_list() {
		let output = format!("{PEER_A}\n{}\n", peer_b());
		let peers = parse_peers(&output);
		assert_eq!(peers.len(), 2);
		assert_eq!(peers[1], peer_b());
	}

	#[tokio::test]
	async fn missing_wg_binary_is_reported() {
		let control = WgCommand::with_binary("wg2fa-definitely-not-a-binary", "wg0");
		let err = control.remove_peer(&peer_b()).await.unwrap_err();
		assert!(matches!(err, ControlError::Tool(WgToolError::NotInstalled(_))));
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn install_passes_preshared_key_file() {
		use std::os::unix::fs::PermissionsExt;

		// Stand-in wg that records its argv and the key file it was pointed at.
		let dir = tempfile::tempdir().unwrap();
		let fake_wg = dir.path().join("wg");
		std::fs::write(
			&fake_wg,
			"#!/bin/sh\nprintf '%s\\n' \"$@\" > \"$0.args\"\ncat \"$6\" > \"$0.psk\"\n",
		)
		.unwrap();
		std::fs::set_permissions(&fake_wg, std::fs::Permissions::from_mode(0o755)).unwrap();

		let control = WgCommand::with_binary(fake_wg.to_string_lossy(), "wg0");
		let psk = WgPresharedKey::generate();
		control
			.install_peer(&peer_b(), &psk, &"10.0.0.3/32".parse().unwrap())
			.await
			.unwrap();

		let args = std::fs::read_to_string(dir.path().join("wg.args")).unwrap();
		let args: Vec<&str> = args.lines().collect();
		let key = peer_b().to_base64();
		assert_eq!(args.len(), 8);
		assert_eq!(&args[..5], ["set", "wg0", "peer", key.as_str(), "preshared-key"]);
		assert_eq!(&args[6..], ["allowed-ips", "10.0.0.3/32"]);

		let staged = std::fs::read_to_string(dir.path().join("wg.psk")).unwrap();
		assert_eq!(staged, psk.to_base64().expose().as_str());
		assert!(!std::path::Path::new(args[5]).exists());
	}
}
