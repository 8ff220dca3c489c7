// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PathsConfigLayer {
	pub client_config_dir: Option<PathBuf>,
}

impl PathsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.client_config_dir.is_some() {
			self.client_config_dir = other.client_config_dir;
		}
	}

	pub fn finalize(self) -> PathsConfig {
		PathsConfig {
			client_config_dir: self.client_config_dir,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
	/// Rendered client configs are also written here when set.
	pub client_config_dir: Option<PathBuf>,
}
