// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session watchdog configuration section.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WatchdogConfigLayer {
	pub enabled: Option<bool>,
	pub interval_secs: Option<u64>,
	pub force_reauth_minutes: Option<i64>,
	pub idle_minutes: Option<i64>,
}

impl WatchdogConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.interval_secs.is_some() {
			self.interval_secs = other.interval_secs;
		}
		if other.force_reauth_minutes.is_some() {
			self.force_reauth_minutes = other.force_reauth_minutes;
		}
		if other.idle_minutes.is_some() {
			self.idle_minutes = other.idle_minutes;
		}
	}

	pub fn finalize(self) -> WatchdogConfig {
		WatchdogConfig {
			enabled: self.enabled.unwrap_or(true),
			interval_secs: self.interval_secs.unwrap_or(30),
			force_reauth_minutes: self.force_reauth_minutes.unwrap_or(0),
			idle_minutes: self.idle_minutes.unwrap_or(0),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchdogConfig {
	pub enabled: bool,
	pub interval_secs: u64,
	/// Evict this long after admission; `0` disables.
	pub force_reauth_minutes: i64,
	/// Evict after this long without a handshake; `0` disables.
	pub idle_minutes: i64,
}

impl Default for WatchdogConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			interval_secs: 30,
			force_reauth_minutes: 0,
			idle_minutes: 0,
		}
	}
}
