// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client-side configuration rendering.

use crate::config::ProvisioningConfig;
use ipnet::IpNet;
use std::fmt::Write;
use wg2fa_common_secret::Secret;
use wg2fa_wireguard::{WgPresharedKey, WgPrivateKey, WgPublicKey};

/// Written in place of the private key when the client supplied its own
/// public key and keeps the private half to itself.
pub const CLIENT_PRIVATE_KEY_PLACEHOLDER: &str = "CLIENT_PRIVATE_KEY";

pub struct ClientConfigParams<'a> {
	pub private_key: Option<&'a WgPrivateKey>,
	pub address: &'a IpNet,
	pub server_public_key: &'a WgPublicKey,
	pub preshared_key: &'a WgPresharedKey,
	pub settings: &'a ProvisioningConfig,
}

/// Renders the `wg-quick` file a client imports. The result can carry a
/// private key, hence the [`Secret`] wrapper.
pub fn render_client_config(params: &ClientConfigParams<'_>) -> Secret<String> {
	let private_key = match params.private_key {
		Some(key) => key.to_base64().into_inner(),
		None => CLIENT_PRIVATE_KEY_PLACEHOLDER.to_string(),
	};
	let dns = params
		.settings
		.dns_servers
		.iter()
		.map(|ip| ip.to_string())
		.collect::<Vec<_>>()
		.join(", ");

	let mut out = String::new();
	out.push_str("[Interface]\n");
	let _ = writeln!(out, "PrivateKey = {private_key}");
	let _ = writeln!(out, "Address = {}", params.address);
	if !dns.is_empty() {
		let _ = writeln!(out, "DNS = {dns}");
	}
	out.push('\n');
	out.push_str("[Peer]\n");
	let _ = writeln!(out, "PublicKey = {}", params.server_public_key);
	let _ = writeln!(
		out,
		"PresharedKey = {}",
		params.preshared_key.to_base64().expose()
	);
	let _ = writeln!(out, "Endpoint = {}", params.settings.endpoint);
	let _ = writeln!(out, "AllowedIPs = {}", params.settings.client_allowed_ips);
	if let Some(keepalive) = params.settings.persistent_keepalive {
		let _ = writeln!(out, "PersistentKeepalive = {keepalive}");
	}

	Secret::new(out)
}
