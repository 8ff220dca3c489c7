// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, a TOML file and the environment.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	CredentialsBackend, LoggingConfigLayer, PathsConfigLayer, RegistryConfigLayer,
	WatchdogConfigLayer, WireGuardConfigLayer,
};

pub const SYSTEM_CONFIG_PATH: &str = "/etc/wg2fa/server.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

pub struct TomlSource {
	path: PathBuf,
	required: bool,
}

impl TomlSource {
	/// A file named explicitly; it must exist.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			required: true,
		}
	}

	/// `/etc/wg2fa/server.toml`, skipped when absent.
	pub fn system() -> Self {
		Self {
			path: PathBuf::from(SYSTEM_CONFIG_PATH),
			required: false,
		}
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.required && !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: `WG2FA_<SECTION>_<FIELD>`
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		load_from(&|name| std::env::var(name).ok())
	}
}

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn var(lookup: Lookup<'_>, name: &str) -> Option<String> {
	lookup(name).filter(|s| !s.is_empty())
}

fn var_bool(lookup: Lookup<'_>, name: &str) -> Option<bool> {
	var(lookup, name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn var_parse<T: std::str::FromStr>(
	lookup: Lookup<'_>,
	name: &str,
	kind: &str,
) -> Result<Option<T>, ConfigError> {
	match var(lookup, name) {
		Some(v) => v.trim().parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid {kind} value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn var_list(lookup: Lookup<'_>, name: &str) -> Option<Vec<String>> {
	var(lookup, name).map(|s| {
		s.split(',')
			.map(|s| s.trim().to_string())
			.filter(|s| !s.is_empty())
			.collect()
	})
}

fn load_from(lookup: Lookup<'_>) -> Result<ServerConfigLayer, ConfigError> {
	Ok(ServerConfigLayer {
		wireguard: Some(load_wireguard(lookup)?),
		registry: Some(RegistryConfigLayer {
			path: var(lookup, "WG2FA_REGISTRY_PATH").map(PathBuf::from),
			allow_create: var_bool(lookup, "WG2FA_REGISTRY_ALLOW_CREATE"),
		}),
		watchdog: Some(WatchdogConfigLayer {
			enabled: var_bool(lookup, "WG2FA_WATCHDOG_ENABLED"),
			interval_secs: var_parse(lookup, "WG2FA_WATCHDOG_INTERVAL_SECS", "u64")?,
			force_reauth_minutes: var_parse(lookup, "WG2FA_WATCHDOG_FORCE_REAUTH_MINUTES", "i64")?,
			idle_minutes: var_parse(lookup, "WG2FA_WATCHDOG_IDLE_MINUTES", "i64")?,
		}),
		paths: Some(PathsConfigLayer {
			client_config_dir: var(lookup, "WG2FA_PATHS_CLIENT_CONFIG_DIR").map(PathBuf::from),
		}),
		logging: Some(LoggingConfigLayer {
			level: var(lookup, "WG2FA_LOGGING_LEVEL"),
			json: var_bool(lookup, "WG2FA_LOGGING_JSON"),
		}),
	})
}

fn load_wireguard(lookup: Lookup<'_>) -> Result<WireGuardConfigLayer, ConfigError> {
	let credentials = match var(lookup, "WG2FA_WIREGUARD_CREDENTIALS") {
		Some(v) => Some(v.parse::<CredentialsBackend>().map_err(|message| {
			ConfigError::InvalidValue {
				key: "WG2FA_WIREGUARD_CREDENTIALS".to_string(),
				message,
			}
		})?),
		None => None,
	};

	Ok(WireGuardConfigLayer {
		config_path: var(lookup, "WG2FA_WIREGUARD_CONFIG_PATH").map(PathBuf::from),
		interface: var(lookup, "WG2FA_WIREGUARD_INTERFACE"),
		endpoint: var(lookup, "WG2FA_WIREGUARD_ENDPOINT"),
		dns_servers: var_list(lookup, "WG2FA_WIREGUARD_DNS_SERVERS"),
		client_allowed_ips: var(lookup, "WG2FA_WIREGUARD_CLIENT_ALLOWED_IPS"),
		persistent_keepalive: var_parse(lookup, "WG2FA_WIREGUARD_PERSISTENT_KEEPALIVE", "u16")?,
		credentials,
		wg_binary: var(lookup, "WG2FA_WIREGUARD_WG_BINARY"),
	})
}
