// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections. Each has a `*ConfigLayer` with all-optional fields
//! for merging and a resolved `*Config`.

mod logging;
mod paths;
mod registry;
mod watchdog;
mod wireguard;

pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use paths::{PathsConfig, PathsConfigLayer};
pub use registry::{RegistryConfig, RegistryConfigLayer};
pub use watchdog::{WatchdogConfig, WatchdogConfigLayer};
pub use wireguard::{CredentialsBackend, WireGuardConfig, WireGuardConfigLayer};
