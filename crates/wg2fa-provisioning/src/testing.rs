// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory stand-ins for the live interface and a registry that can be told
//! to fail, plus a scratch environment wiring them into a service.

use crate::config::ProvisioningConfig;
use crate::registry::ClientRegistry;
use crate::service::ProvisioningService;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wg2fa_db::testing::create_test_repository;
use wg2fa_db::{ClientRepository, ClientRowTuple, ClientStore, DbError};
use wg2fa_wireguard::{
	ControlError, InterfaceControl, LocalCredentials, WgConfigFile, WgPresharedKey, WgPublicKey,
	WgToolError,
};

pub const STATIC_PEER: &str = "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=";

pub fn wg0_conf(address: &str) -> String {
	format!(
		"[Interface]\nAddress = {address}\nListenPort = 51820\nPrivateKey = YF4YWG1+uqRJe1uRnn+/S4JPALCfHUxEgug+W+XvNEY=\n\n[Peer]\nPublicKey = {STATIC_PEER}\nAllowedIPs = 10.0.0.200/32\n"
	)
}

#[derive(Default)]
pub struct FakeControl {
	pub peers: Mutex<HashMap<WgPublicKey, IpNet>>,
	pub handshakes: Mutex<HashMap<WgPublicKey, DateTime<Utc>>>,
	pub fail_install: AtomicBool,
	pub fail_telemetry: AtomicBool,
}

impl FakeControl {
	pub fn has_peer(&self, key: &WgPublicKey) -> bool {
		self.peers.lock().unwrap().contains_key(key)
	}

	pub fn set_handshake(&self, key: WgPublicKey, at: DateTime<Utc>) {
		self.handshakes.lock().unwrap().insert(key, at);
	}

	fn failure(what: &str) -> ControlError {
		ControlError::Tool(WgToolError::CommandFailed {
			binary: "wg".to_string(),
			args: vec![what.to_string()],
			stderr: "Operation not permitted".to_string(),
		})
	}
}

#[async_trait]
impl InterfaceControl for FakeControl {
	async fn install_peer(
		&self,
		public_key: &WgPublicKey,
		_preshared_key: &WgPresharedKey,
		allowed_ips: &IpNet,
	) -> Result<(), ControlError> {
		if self.fail_install.load(Ordering::SeqCst) {
			return Err(Self::failure("set"));
		}
		self.peers.lock().unwrap().insert(*public_key, *allowed_ips);
		Ok(())
	}

	async fn remove_peer(&self, public_key: &WgPublicKey) -> Result<(), ControlError> {
		self.peers.lock().unwrap().remove(public_key);
		Ok(())
	}

	async fn last_handshakes(&self) -> Result<HashMap<WgPublicKey, DateTime<Utc>>, ControlError> {
		if self.fail_telemetry.load(Ordering::SeqCst) {
			return Err(Self::failure("show"));
		}
		Ok(self.handshakes.lock().unwrap().clone())
	}

	async fn list_peers(&self) -> Result<Vec<WgPublicKey>, ControlError> {
		Ok(self.peers.lock().unwrap().keys().copied().collect())
	}
}

/// Registry store that can refuse inserts.
pub struct FlakyStore {
	pub inner: ClientRepository,
	pub fail_add: AtomicBool,
}

#[async_trait]
impl ClientStore for FlakyStore {
	async fn list(&self) -> Result<Vec<ClientRowTuple>, DbError> {
		self.inner.list().await
	}

	async fn get(&self, public_key: &str) -> Result<Option<ClientRowTuple>, DbError> {
		self.inner.get(public_key).await
	}

	async fn add(&self, public_key: &str, name: &str, ip: &str, added: &str) -> Result<(), DbError> {
		if self.fail_add.load(Ordering::SeqCst) {
			return Err(DbError::Internal("database is locked".to_string()));
		}
		self.inner.add(public_key, name, ip, added).await
	}

	async fn remove(&self, public_key: &str) -> Result<u64, DbError> {
		self.inner.remove(public_key).await
	}
}

pub struct TestEnv {
	pub service: ProvisioningService,
	pub control: Arc<FakeControl>,
	pub store: Arc<FlakyStore>,
	pub config_file: Arc<WgConfigFile>,
	pub dir: TempDir,
}

impl TestEnv {
	pub async fn new() -> Self {
		Self::with_address("10.0.0.1/24").await
	}

	pub async fn with_address(address: &str) -> Self {
		Self::build(address, ProvisioningConfig::new("vpn.example.com:51820")).await
	}

	pub async fn build(address: &str, settings: ProvisioningConfig) -> Self {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("wg0.conf");
		std::fs::write(&path, wg0_conf(address)).unwrap();

		let config_file = Arc::new(WgConfigFile::new(path));
		let control = Arc::new(FakeControl::default());
		let store = Arc::new(FlakyStore {
			inner: create_test_repository().await,
			fail_add: AtomicBool::new(false),
		});

		let service = ProvisioningService::new(
			config_file.clone(),
			ClientRegistry::new(store.clone()),
			Arc::new(LocalCredentials),
			control.clone(),
			settings,
		);

		Self {
			service,
			control,
			store,
			config_file,
			dir,
		}
	}

	pub fn config_text(&self) -> String {
		std::fs::read_to_string(self.config_file.path()).unwrap()
	}
}

/// A service over on-disk files, the way a separate `wg2fa` process would see
/// them: its own config file handle and its own registry pool.
pub async fn service_over_files(
	conf: &Path,
	registry: &Path,
	control: Arc<FakeControl>,
) -> ProvisioningService {
	ProvisioningService::new(
		Arc::new(WgConfigFile::new(conf)),
		ClientRegistry::open(registry, true).await.unwrap(),
		Arc::new(LocalCredentials),
		control,
		ProvisioningConfig::new("vpn.example.com:51820"),
	)
}
