// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client registry configuration section.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_REGISTRY_PATH: &str = "/etc/wireguard/clientList";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegistryConfigLayer {
	pub path: Option<PathBuf>,
	pub allow_create: Option<bool>,
}

impl RegistryConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.path.is_some() {
			self.path = other.path;
		}
		if other.allow_create.is_some() {
			self.allow_create = other.allow_create;
		}
	}

	pub fn finalize(self) -> RegistryConfig {
		RegistryConfig {
			path: self
				.path
				.unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRY_PATH)),
			allow_create: self.allow_create.unwrap_or(true),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryConfig {
	pub path: PathBuf,
	pub allow_create: bool,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		RegistryConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_values() {
		let config = RegistryConfig::default();
		assert_eq!(config.path, PathBuf::from("/etc/wireguard/clientList"));
		assert!(config.allow_create);
	}

	#[test]
	fn test_deserialize_layer_partial() {
		let layer: RegistryConfigLayer = toml::from_str("allow_create = false").unwrap();
		assert!(layer.path.is_none());
		assert!(!layer.finalize().allow_create);
	}
}
