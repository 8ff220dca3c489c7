// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod config;
pub mod drift;
pub mod error;
pub mod registry;
pub mod render;
pub mod service;
pub mod watchdog;

#[cfg(test)]
mod testing;

pub use config::ProvisioningConfig;
pub use drift::DriftReport;
pub use error::{ErrorKind, ProvisionError, Result};
pub use registry::{ClientRecord, ClientRegistry, RegistryScan};
pub use render::CLIENT_PRIVATE_KEY_PLACEHOLDER;
pub use service::{validate_name, AdmissionRequest, ClientProfile, ProvisioningService};
pub use watchdog::{EvictionReason, ReconcileReport, Watchdog, WatchdogHandle, WatchdogPolicy};

use std::sync::Arc;
use std::time::Duration;
use wg2fa_wireguard::{CredentialSource, InterfaceControl, WgConfigFile};

/// Everything a front end needs, wired over one config file and registry.
#[derive(Clone)]
pub struct Wg2faServices {
	pub provisioning: ProvisioningService,
	pub watchdog: Option<Watchdog>,
}

impl Wg2faServices {
	/// Wires the services and checks the interface config once, so a missing
	/// private key or address fails here rather than on the first request.
	pub async fn new(
		config_file: Arc<WgConfigFile>,
		registry: ClientRegistry,
		credentials: Arc<dyn CredentialSource>,
		control: Arc<dyn InterfaceControl>,
		settings: ProvisioningConfig,
		watchdog: Option<(WatchdogPolicy, Duration)>,
	) -> Result<Self> {
		let provisioning =
			ProvisioningService::new(config_file, registry, credentials, control, settings);
		let host_key = provisioning.host_public_key().await?;
		tracing::info!(public_key = %host_key, "interface configuration loaded");

		let watchdog = watchdog
			.map(|(policy, interval)| Watchdog::new(provisioning.clone(), policy, interval));

		Ok(Self {
			provisioning,
			watchdog,
		})
	}
}
