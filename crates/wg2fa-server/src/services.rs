// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wiring from resolved configuration to the provisioning services.

use std::sync::Arc;
use std::time::Duration;
use wg2fa_provisioning::{ClientRegistry, ProvisioningConfig, Wg2faServices, WatchdogPolicy};
use wg2fa_server_config::{CredentialsBackend, ServerConfig};
use wg2fa_wireguard::{
	CredentialSource, InterfaceControl, LocalCredentials, WgCommand, WgConfigFile,
	WgToolCredentials,
};

pub fn provisioning_settings(config: &ServerConfig) -> ProvisioningConfig {
	ProvisioningConfig {
		endpoint: config.wireguard.endpoint.clone(),
		dns_servers: config.wireguard.dns_servers.clone(),
		client_allowed_ips: config.wireguard.client_allowed_ips.clone(),
		persistent_keepalive: config.wireguard.persistent_keepalive,
		client_config_dir: config.paths.client_config_dir.clone(),
	}
}

/// `None` when the watchdog is switched off or has no threshold to enforce.
pub fn watchdog_settings(config: &ServerConfig) -> Option<(WatchdogPolicy, Duration)> {
	if !config.watchdog.enabled {
		return None;
	}

	let policy = WatchdogPolicy::from_minutes(
		config.watchdog.force_reauth_minutes,
		config.watchdog.idle_minutes,
	);
	if !policy.is_enabled() {
		tracing::info!("watchdog enabled without thresholds, sessions never expire");
		return None;
	}

	Some((policy, Duration::from_secs(config.watchdog.interval_secs)))
}

fn credential_source(config: &ServerConfig) -> Arc<dyn CredentialSource> {
	match config.wireguard.credentials {
		CredentialsBackend::WgTool => Arc::new(WgToolCredentials::new(&config.wireguard.wg_binary)),
		CredentialsBackend::Local => Arc::new(LocalCredentials),
	}
}

/// Opens the registry and checks the interface config. The watchdog is only
/// wired when `with_watchdog` is set, so one-shot commands never schedule it.
pub async fn build_services(
	config: &ServerConfig,
	with_watchdog: bool,
) -> anyhow::Result<Wg2faServices> {
	let config_file = Arc::new(WgConfigFile::new(&config.wireguard.config_path));
	let registry = ClientRegistry::open(&config.registry.path, config.registry.allow_create).await?;
	let control: Arc<dyn InterfaceControl> = Arc::new(WgCommand::with_binary(
		&config.wireguard.wg_binary,
		&config.wireguard.interface,
	));

	let watchdog = if with_watchdog {
		watchdog_settings(config)
	} else {
		None
	};

	let services = Wg2faServices::new(
		config_file,
		registry,
		credential_source(config),
		control,
		provisioning_settings(config),
		watchdog,
	)
	.await?;

	Ok(services)
}

#[cfg(test)]
mod tests {
	use super::*;
	use wg2fa_server_config::{PathsConfig, RegistryConfig, WatchdogConfig, WireGuardConfig};

	const INTERFACE_PRIVATE_KEY: &str = "YF4YWG1+uqRJe1uRnn+/S4JPALCfHUxEgug+W+XvNEY=";

	fn config() -> ServerConfig {
		ServerConfig {
			wireguard: WireGuardConfig {
				endpoint: "vpn.example.com:51820".to_string(),
				persistent_keepalive: Some(25),
				..Default::default()
			},
			paths: PathsConfig {
				client_config_dir: Some("/var/lib/wg2fa".into()),
			},
			..Default::default()
		}
	}

	#[test]
	fn settings_follow_config() {
		let settings = provisioning_settings(&config());
		assert_eq!(settings.endpoint, "vpn.example.com:51820");
		assert_eq!(settings.dns_servers.len(), 2);
		assert_eq!(settings.persistent_keepalive, Some(25));
		assert_eq!(
			settings.client_config_dir,
			Some(std::path::PathBuf::from("/var/lib/wg2fa"))
		);
	}

	#[test]
	fn watchdog_needs_a_threshold() {
		let mut config = config();
		assert!(watchdog_settings(&config).is_none());

		config.watchdog = WatchdogConfig {
			idle_minutes: 10,
			interval_secs: 5,
			..Default::default()
		};
		let (policy, interval) = watchdog_settings(&config).unwrap();
		assert!(policy.idle.is_some());
		assert!(policy.force_reauth.is_none());
		assert_eq!(interval, Duration::from_secs(5));

		config.watchdog.enabled = false;
		assert!(watchdog_settings(&config).is_none());
	}

	#[tokio::test]
	async fn builds_against_scratch_files() {
		let dir = tempfile::tempdir().unwrap();
		let conf_path = dir.path().join("wg0.conf");
		std::fs::write(
			&conf_path,
			format!(
				"[Interface]\nPrivateKey = {INTERFACE_PRIVATE_KEY}\nAddress = 10.0.0.1/24\nListenPort = 51820\n"
			),
		)
		.unwrap();

		let mut config = config();
		config.wireguard.config_path = conf_path;
		config.wireguard.credentials = CredentialsBackend::Local;
		config.registry = RegistryConfig {
			path: dir.path().join("clientList"),
			allow_create: true,
		};
		config.watchdog.force_reauth_minutes = 60;

		let services = build_services(&config, true).await.unwrap();
		assert!(services.watchdog.is_some());
		assert!(services
			.provisioning
			.list_active()
			.await
			.unwrap()
			.is_empty());

		let one_shot = build_services(&config, false).await.unwrap();
		assert!(one_shot.watchdog.is_none());
	}

	#[tokio::test]
	async fn missing_registry_without_create_fails() {
		let dir = tempfile::tempdir().unwrap();
		let conf_path = dir.path().join("wg0.conf");
		std::fs::write(
			&conf_path,
			format!("[Interface]\nPrivateKey = {INTERFACE_PRIVATE_KEY}\nAddress = 10.0.0.1/24\n"),
		)
		.unwrap();

		let mut config = config();
		config.wireguard.config_path = conf_path;
		config.wireguard.credentials = CredentialsBackend::Local;
		config.registry = RegistryConfig {
			path: dir.path().join("clientList"),
			allow_create: false,
		};

		assert!(build_services(&config, false).await.is_err());
	}

	#[tokio::test]
	async fn missing_private_key_fails_fast() {
		let dir = tempfile::tempdir().unwrap();
		let conf_path = dir.path().join("wg0.conf");
		std::fs::write(&conf_path, "[Interface]\nAddress = 10.0.0.1/24\n").unwrap();

		let mut config = config();
		config.wireguard.config_path = conf_path;
		config.wireguard.credentials = CredentialsBackend::Local;
		config.registry.path = dir.path().join("clientList");

		assert!(build_services(&config, false).await.is_err());
	}
}
