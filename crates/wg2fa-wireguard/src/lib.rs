// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WireGuard building blocks for wg2fa: key types, the interface config file,
//! tunnel address allocation, key generation and live interface control.

pub mod conf;
pub mod control;
pub mod credentials;
pub mod ip;
pub mod keys;
pub mod tool;

pub use conf::{
	find_section, parse_config, parse_str, render_peer_block, ConfFileError, ConfigFileLock,
	ConfigSection, InterfaceSection, WgConfigFile, DEFAULT_SECTION, INTERFACE_SECTION, PEER_SECTION,
};
pub use control::{parse_latest_handshakes, ControlError, InterfaceControl, WgCommand};
pub use credentials::{CredentialError, CredentialSource, LocalCredentials, WgToolCredentials};
pub use ip::{allocate, host_net, parse_host, IpError};
pub use keys::{KeyError, WgKeyPair, WgPresharedKey, WgPrivateKey, WgPublicKey, KEY_LEN};
pub use tool::{run_wg, WgToolError, DEFAULT_WG_BINARY};
