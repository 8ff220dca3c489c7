// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::sections::{
	LoggingConfigLayer, PathsConfigLayer, RegistryConfigLayer, WatchdogConfigLayer,
	WireGuardConfigLayer,
};

/// One source's view of the configuration; `None` means "not set here".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfigLayer {
	pub wireguard: Option<WireGuardConfigLayer>,
	pub registry: Option<RegistryConfigLayer>,
	pub watchdog: Option<WatchdogConfigLayer>,
	pub paths: Option<PathsConfigLayer>,
	pub logging: Option<LoggingConfigLayer>,
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	if let Some(other) = other {
		match base {
			Some(b) => merge(b, other),
			None => *base = Some(other),
		}
	}
}

impl ServerConfigLayer {
	/// Overlays `other` on top of `self`.
	pub fn merge(&mut self, other: Self) {
		merge_section(&mut self.wireguard, other.wireguard, WireGuardConfigLayer::merge);
		merge_section(&mut self.registry, other.registry, RegistryConfigLayer::merge);
		merge_section(&mut self.watchdog, other.watchdog, WatchdogConfigLayer::merge);
		merge_section(&mut self.paths, other.paths, PathsConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}
