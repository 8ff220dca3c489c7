// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cross-check of the three places a peer lives: the registry, the running
//! interface and the interface config file.

use serde::Serialize;
use std::collections::BTreeSet;
use wg2fa_wireguard::WgPublicKey;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
	/// Registered, but not installed on the running interface.
	pub missing_live: Vec<WgPublicKey>,
	/// Installed on the running interface without a registry record.
	pub unregistered_live: Vec<WgPublicKey>,
	/// Registered, but no `[Peer]` block in the config file.
	pub missing_config: Vec<WgPublicKey>,
	/// `[Peer]` block in the config file without a registry record.
	pub unregistered_config: Vec<WgPublicKey>,
}

impl DriftReport {
	pub fn compute(
		registry: impl IntoIterator<Item = WgPublicKey>,
		live: impl IntoIterator<Item = WgPublicKey>,
		config: impl IntoIterator<Item = WgPublicKey>,
	) -> Self {
		let registry: BTreeSet<_> = registry.into_iter().collect();
		let live: BTreeSet<_> = live.into_iter().collect();
		let config: BTreeSet<_> = config.into_iter().collect();

		Self {
			missing_live: registry.difference(&live).copied().collect(),
			unregistered_live: live.difference(&registry).copied().collect(),
			missing_config: registry.difference(&config).copied().collect(),
			unregistered_config: config.difference(&registry).copied().collect(),
		}
	}

	pub fn is_clean(&self) -> bool {
		self.missing_live.is_empty()
			&& self.unregistered_live.is_empty()
			&& self.missing_config.is_empty()
			&& self.unregistered_config.is_empty()
	}
}
