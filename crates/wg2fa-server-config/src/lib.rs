// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the wg2fa server.
//!
//! This crate provides:
//! - Layered configuration from defaults, a TOML file and the environment
//! - Startup validation of the settings provisioning depends on
//! - Consistent environment variable naming (`WG2FA_*`)
//!
//! # Usage
//!
//! ```ignore
//! use wg2fa_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("managing {} via {}", config.wireguard.interface, config.wireguard.config_path.display());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerConfig {
	pub wireguard: WireGuardConfig,
	pub registry: RegistryConfig,
	pub watchdog: WatchdogConfig,
	pub paths: PathsConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`WG2FA_*`)
/// 2. Config file (`/etc/wg2fa/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	let sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	];
	load_from_sources(sources)
}

/// Load configuration with a custom config file path, which must exist.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	let sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	];
	load_from_sources(sources)
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let config = ServerConfig {
		wireguard: layer.wireguard.unwrap_or_default().finalize()?,
		registry: layer.registry.unwrap_or_default().finalize(),
		watchdog: layer.watchdog.unwrap_or_default().finalize(),
		paths: layer.paths.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		interface = %config.wireguard.interface,
		config_path = %config.wireguard.config_path.display(),
		endpoint = %config.wireguard.endpoint,
		registry = %config.registry.path.display(),
		watchdog_enabled = config.watchdog.enabled,
		force_reauth_minutes = config.watchdog.force_reauth_minutes,
		idle_minutes = config.watchdog.idle_minutes,
		"Server configuration loaded"
	);

	Ok(config)
}

/// Checks carried over from server initialisation.
fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	let endpoint = config.wireguard.endpoint.trim();
	if endpoint.is_empty() {
		return Err(ConfigError::Validation(
			"wireguard.endpoint (WG2FA_WIREGUARD_ENDPOINT) must be set to the public host:port"
				.to_string(),
		));
	}
	if !endpoint.contains(':') {
		return Err(ConfigError::Validation(format!(
			"wireguard.endpoint '{endpoint}' must be in host:port form"
		)));
	}

	if config.wireguard.interface.trim().is_empty() {
		return Err(ConfigError::Validation(
			"wireguard.interface must not be empty".to_string(),
		));
	}

	if config.watchdog.interval_secs == 0 {
		return Err(ConfigError::Validation(
			"watchdog.interval_secs must be greater than zero".to_string(),
		));
	}

	Ok(())
}
