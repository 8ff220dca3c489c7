// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WireGuard interface configuration section.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/wireguard/wg0.conf";
pub const DEFAULT_INTERFACE: &str = "wg0";
pub const DEFAULT_DNS_SERVERS: [&str; 2] = ["8.8.8.8", "8.8.4.4"];
pub const DEFAULT_CLIENT_ALLOWED_IPS: &str = "0.0.0.0/0, ::/0";
pub const DEFAULT_WG_BINARY: &str = "wg";

/// Where fresh keys come from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialsBackend {
	/// `wg genkey` / `wg pubkey` / `wg genpsk`.
	#[default]
	WgTool,
	/// In-process x25519.
	Local,
}

impl std::str::FromStr for CredentialsBackend {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"wg-tool" | "wg" => Ok(CredentialsBackend::WgTool),
			"local" => Ok(CredentialsBackend::Local),
			other => Err(format!("unknown credentials backend '{other}'")),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WireGuardConfigLayer {
	pub config_path: Option<PathBuf>,
	pub interface: Option<String>,
	pub endpoint: Option<String>,
	pub dns_servers: Option<Vec<String>>,
	pub client_allowed_ips: Option<String>,
	pub persistent_keepalive: Option<u16>,
	pub credentials: Option<CredentialsBackend>,
	pub wg_binary: Option<String>,
}

impl WireGuardConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.config_path.is_some() {
			self.config_path = other.config_path;
		}
		if other.interface.is_some() {
			self.interface = other.interface;
		}
		if other.endpoint.is_some() {
			self.endpoint = other.endpoint;
		}
		if other.dns_servers.is_some() {
			self.dns_servers = other.dns_servers;
		}
		if other.client_allowed_ips.is_some() {
			self.client_allowed_ips = other.client_allowed_ips;
		}
		if other.persistent_keepalive.is_some() {
			self.persistent_keepalive = other.persistent_keepalive;
		}
		if other.credentials.is_some() {
			self.credentials = other.credentials;
		}
		if other.wg_binary.is_some() {
			self.wg_binary = other.wg_binary;
		}
	}

	/// DNS entries are parsed here, so an unparsable one fails the load.
	pub fn finalize(self) -> Result<WireGuardConfig, ConfigError> {
		let dns_servers = match self.dns_servers {
			Some(servers) => servers
				.iter()
				.map(|s| {
					s.trim().parse::<IpAddr>().map_err(|_| ConfigError::InvalidValue {
						key: "wireguard.dns_servers".to_string(),
						message: format!("'{s}' is not an IP address"),
					})
				})
				.collect::<Result<Vec<_>, _>>()?,
			None => default_dns_servers(),
		};

		Ok(WireGuardConfig {
			config_path: self
				.config_path
				.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
			interface: self
				.interface
				.unwrap_or_else(|| DEFAULT_INTERFACE.to_string()),
			endpoint: self.endpoint.unwrap_or_default(),
			dns_servers,
			client_allowed_ips: self
				.client_allowed_ips
				.unwrap_or_else(|| DEFAULT_CLIENT_ALLOWED_IPS.to_string()),
			persistent_keepalive: self.persistent_keepalive,
			credentials: self.credentials.unwrap_or_default(),
			wg_binary: self
				.wg_binary
				.unwrap_or_else(|| DEFAULT_WG_BINARY.to_string()),
		})
	}
}

fn default_dns_servers() -> Vec<IpAddr> {
	DEFAULT_DNS_SERVERS
		.iter()
		.filter_map(|s| s.parse().ok())
		.collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireGuardConfig {
	pub config_path: PathBuf,
	pub interface: String,
	/// `host:port` clients dial. Empty until configured.
	pub endpoint: String,
	pub dns_servers: Vec<IpAddr>,
	pub client_allowed_ips: String,
	pub persistent_keepalive: Option<u16>,
	pub credentials: CredentialsBackend,
	pub wg_binary: String,
}

impl Default for WireGuardConfig {
	fn default() -> Self {
		Self {
			config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
			interface: DEFAULT_INTERFACE.to_string(),
			endpoint: String::new(),
			dns_servers: default_dns_servers(),
			client_allowed_ips: DEFAULT_CLIENT_ALLOWED_IPS.to_string(),
			persistent_keepalive: None,
			credentials: CredentialsBackend::WgTool,
			wg_binary: DEFAULT_WG_BINARY.to_string(),
		}
	}
}
