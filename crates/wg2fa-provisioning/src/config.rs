// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

pub const DEFAULT_CLIENT_ALLOWED_IPS: &str = "0.0.0.0/0, ::/0";

/// Settings that shape the client profiles handed out by provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
	/// Public `host:port` clients dial.
	pub endpoint: String,
	pub dns_servers: Vec<IpAddr>,
	pub client_allowed_ips: String,
	pub persistent_keepalive: Option<u16>,
	/// When set, each rendered client config is also written to `<dir>/<name>.conf`.
	pub client_config_dir: Option<PathBuf>,
}

impl ProvisioningConfig {
	pub fn new(endpoint: impl Into<String>) -> Self {
		Self {
			endpoint: endpoint.into(),
			dns_servers: vec![
				IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
				IpAddr::V4(Ipv4Addr::new(8, 8, 4, 4)),
			],
			client_allowed_ips: DEFAULT_CLIENT_ALLOWED_IPS.to_string(),
			persistent_keepalive: None,
			client_config_dir: None,
		}
	}
}
