// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Admission and revocation of peers.
//!
//! A provision touches three stores in a fixed order: the config file, the
//! running interface, then the registry. Allocation through the registry
//! commit runs under the config file lock, which is shared by every process
//! managing the interface, so two requests can never be handed the same
//! address. Revocation takes the same lock.

use crate::config::ProvisioningConfig;
use crate::drift::DriftReport;
use crate::error::{ProvisionError, Result};
use crate::registry::{ClientRecord, ClientRegistry};
use crate::render::{render_client_config, ClientConfigParams};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, instrument, warn};
use wg2fa_wireguard::{
	allocate, host_net, render_peer_block, CredentialSource, InterfaceControl, WgConfigFile,
	WgPublicKey,
};

/// An admission as handed over by the request layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdmissionRequest {
	pub client_name: String,
	/// Base64 public key the client generated itself. Empty or absent means
	/// the server mints a key pair.
	#[serde(default)]
	pub public_key: Option<String>,
	/// Resolved by the authentication layer, never read from the payload.
	#[serde(skip)]
	pub authenticated: bool,
}

/// What a successful admission hands back to the client.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientProfile {
	pub client_name: String,
	pub public_key: WgPublicKey,
	/// Complete `wg-quick` config; carries the private key when it was minted.
	pub wg_conf: String,
}

impl fmt::Debug for ClientProfile {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ClientProfile")
			.field("client_name", &self.client_name)
			.field("public_key", &self.public_key)
			.field("wg_conf", &"[REDACTED]")
			.finish()
	}
}

/// Names end up in the registry and in file names.
pub fn validate_name(name: &str) -> Result<()> {
	let valid = !name.is_empty()
		&& name
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '@' | '_' | '-'));
	if valid {
		Ok(())
	} else {
		Err(ProvisionError::InvalidName(name.to_string()))
	}
}

#[derive(Clone)]
pub struct ProvisioningService {
	config_file: Arc<WgConfigFile>,
	registry: ClientRegistry,
	credentials: Arc<dyn CredentialSource>,
	control: Arc<dyn InterfaceControl>,
	settings: Arc<ProvisioningConfig>,
}

impl ProvisioningService {
	pub fn new(
		config_file: Arc<WgConfigFile>,
		registry: ClientRegistry,
		credentials: Arc<dyn CredentialSource>,
		control: Arc<dyn InterfaceControl>,
		settings: ProvisioningConfig,
	) -> Self {
		Self {
			config_file,
			registry,
			credentials,
			control,
			settings: Arc::new(settings),
		}
	}

	pub fn registry(&self) -> &ClientRegistry {
		&self.registry
	}

	pub fn control(&self) -> &Arc<dyn InterfaceControl> {
		&self.control
	}

	pub fn settings(&self) -> &ProvisioningConfig {
		&self.settings
	}

	/// Reads the interface section and derives the host public key. Used at
	/// startup so a broken config fails before any request is served.
	#[instrument(skip(self), fields(path = %self.config_file.path().display()))]
	pub async fn host_public_key(&self) -> Result<WgPublicKey> {
		let interface = self.config_file.interface().await?;
		Ok(self
			.credentials
			.derive_public_key(&interface.private_key)
			.await?)
	}

	#[instrument(skip(self, request), fields(name = %request.client_name))]
	pub async fn admit(&self, request: AdmissionRequest) -> Result<ClientProfile> {
		if !request.authenticated {
			warn!("rejecting unauthenticated admission");
			return Err(ProvisionError::Unauthenticated);
		}
		self
			.provision(&request.client_name, request.public_key.as_deref())
			.await
	}

	#[instrument(skip(self, public_key), fields(%name))]
	pub async fn provision(&self, name: &str, public_key: Option<&str>) -> Result<ClientProfile> {
		validate_name(name)?;
		let supplied = match public_key.map(str::trim).filter(|k| !k.is_empty()) {
			Some(key) => Some(WgPublicKey::from_base64(key).map_err(ProvisionError::InvalidPublicKey)?),
			None => None,
		};

		let interface = self.config_file.interface().await?;
		let server_public_key = self
			.credentials
			.derive_public_key(&interface.private_key)
			.await?;
		let preshared_key = self.credentials.generate_preshared_key().await?;
		let (client_private_key, client_public_key) = match supplied {
			Some(key) => (None, key),
			None => {
				let (private, public) = self.credentials.generate_key_pair().await?.into_parts();
				(Some(private), public)
			}
		};
		let key_b64 = client_public_key.to_base64();

		let record = {
			let admission = self.config_file.lock().await?;

			if self.registry.get(&client_public_key).await?.is_some() {
				return Err(ProvisionError::DuplicateKey(key_b64));
			}

			let mut excluded = self.registry.addresses().await?;
			excluded.insert(interface.address.addr());
			let address = allocate(&interface.address, &excluded)?;
			let allowed_ips = host_net(address.addr());

			let block = render_peer_block(
				&client_public_key,
				preshared_key.to_base64().expose(),
				&allowed_ips,
			);
			admission.append_peer_block(&block, &key_b64).await?;

			if let Err(e) = self
				.control
				.install_peer(&client_public_key, &preshared_key, &allowed_ips)
				.await
			{
				if let Err(cleanup) = admission.remove_peer_block(&key_b64).await {
					warn!(public_key = %key_b64, error = %cleanup, "failed to drop peer block after install failure");
				}
				return Err(e.into());
			}

			match self.registry.add(name, &client_public_key, &address).await {
				Ok(record) => record,
				Err(source) => {
					error!(
						inconsistency = true,
						public_key = %key_b64,
						%address,
						error = %source,
						"peer is live but the registry commit failed"
					);
					return Err(ProvisionError::Inconsistency {
						public_key: key_b64,
						source,
					});
				}
			}
		};

		let wg_conf = render_client_config(&ClientConfigParams {
			private_key: client_private_key.as_ref(),
			address: &record.address,
			server_public_key: &server_public_key,
			preshared_key: &preshared_key,
			settings: &self.settings,
		});

		if let Some(dir) = &self.settings.client_config_dir {
			if let Err(e) = write_client_file(dir, name, wg_conf.expose()).await {
				warn!(dir = %dir.display(), error = %e, "failed to write client config file");
			}
		}

		info!(
			public_key = %key_b64,
			address = %record.address,
			minted_key = client_private_key.is_some(),
			"client provisioned"
		);

		Ok(ClientProfile {
			client_name: record.name,
			public_key: record.public_key,
			wg_conf: wg_conf.into_inner(),
		})
	}

	/// Removes a peer everywhere. Unknown keys are not an error.
	#[instrument(skip(self), fields(public_key = %public_key))]
	pub async fn revoke(&self, public_key: &WgPublicKey) -> Result<()> {
		let admission = self.config_file.lock().await?;

		if let Err(e) = self.control.remove_peer(public_key).await {
			warn!(error = %e, "failed to remove peer from live interface");
		}

		let key_b64 = public_key.to_base64();
		match admission.remove_peer_block(&key_b64).await {
			Ok(removed) => debug!(removed, "config file updated"),
			Err(e) => warn!(error = %e, "failed to remove peer block from config file"),
		}

		let removed = self.registry.remove(public_key).await?;
		info!(removed, "client revoked");
		Ok(())
	}

	pub async fn list_active(&self) -> Result<Vec<ClientRecord>> {
		Ok(self.registry.list().await?)
	}

	#[instrument(skip(self))]
	pub async fn drift(&self) -> Result<DriftReport> {
		let registry: Vec<WgPublicKey> = self
			.registry
			.list()
			.await?
			.into_iter()
			.map(|r| r.public_key)
			.collect();
		let live = self.control.list_peers().await?;
		let config: Vec<WgPublicKey> = self
			.config_file
			.peer_keys()
			.await?
			.iter()
			.filter_map(|k| WgPublicKey::from_base64(k).ok())
			.collect();

		let report = DriftReport::compute(registry, live, config);
		if !report.is_clean() {
			warn!(
				missing_live = report.missing_live.len(),
				unregistered_live = report.unregistered_live.len(),
				missing_config = report.missing_config.len(),
				unregistered_config = report.unregistered_config.len(),
				"registry drift detected"
			);
		}
		Ok(report)
	}
}

async fn write_client_file(dir: &Path, name: &str, contents: &str) -> std::io::Result<()> {
	let path = dir.join(format!("{name}.conf"));
	let mut options = tokio::fs::OpenOptions::new();
	options.write(true).create(true).truncate(true);
	#[cfg(unix)]
	options.mode(0o600);

	let mut file = options.open(&path).await?;
	file.write_all(contents.as_bytes()).await?;
	file.flush().await?;
	debug!(path = %path.display(), "wrote client config");
	Ok(())
}
