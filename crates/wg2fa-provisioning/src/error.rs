// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ipnet::IpNet;
use thiserror::Error;
use wg2fa_db::DbError;
use wg2fa_wireguard::{ConfFileError, ControlError, CredentialError, IpError, KeyError};

/// Coarse classification callers map to their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	InvalidInput,
	Conflict,
	ResourceExhausted,
	Storage,
	InconsistencyDetected,
	Unauthenticated,
	Config,
}

#[derive(Error, Debug)]
pub enum ProvisionError {
	#[error("invalid client name {0:?}: use letters, digits, '.', '@', '_' or '-'")]
	InvalidName(String),

	#[error("invalid public key: {0}")]
	InvalidPublicKey(#[source] KeyError),

	#[error("request is not authenticated")]
	Unauthenticated,

	#[error("a peer with public key {0} is already provisioned")]
	DuplicateKey(String),

	#[error("no free address left in {0}")]
	AddressSpaceExhausted(IpNet),

	#[error("interface configuration error: {0}")]
	Config(String),

	#[error("interface config file unavailable: {0}")]
	ConfigFile(#[source] ConfFileError),

	#[error("credential source failed: {0}")]
	Credentials(#[from] CredentialError),

	#[error("live interface update failed: {0}")]
	Control(#[from] ControlError),

	#[error("client registry error: {0}")]
	Storage(#[from] DbError),

	#[error("peer {public_key} is live on the interface but missing from the registry: {source}")]
	Inconsistency {
		public_key: String,
		#[source]
		source: DbError,
	},
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

impl ProvisionError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			ProvisionError::InvalidName(_) | ProvisionError::InvalidPublicKey(_) => {
				ErrorKind::InvalidInput
			}
			ProvisionError::Unauthenticated => ErrorKind::Unauthenticated,
			ProvisionError::DuplicateKey(_) => ErrorKind::Conflict,
			ProvisionError::AddressSpaceExhausted(_) => ErrorKind::ResourceExhausted,
			ProvisionError::Config(_) | ProvisionError::Credentials(_) => ErrorKind::Config,
			ProvisionError::Storage(DbError::Conflict(_)) => ErrorKind::Conflict,
			ProvisionError::Storage(_) | ProvisionError::Control(_) | ProvisionError::ConfigFile(_) => {
				ErrorKind::Storage
			}
			ProvisionError::Inconsistency { .. } => ErrorKind::InconsistencyDetected,
		}
	}
}

impl From<ConfFileError> for ProvisionError {
	fn from(e: ConfFileError) -> Self {
		match e {
			ConfFileError::DuplicatePeer(key) => ProvisionError::DuplicateKey(key),
			io @ ConfFileError::Io { .. } => ProvisionError::ConfigFile(io),
			other => ProvisionError::Config(other.to_string()),
		}
	}
}

impl From<IpError> for ProvisionError {
	fn from(e: IpError) -> Self {
		match e {
			IpError::PoolExhausted(range) => ProvisionError::AddressSpaceExhausted(range),
			IpError::InvalidAddress(addr) => {
				ProvisionError::Config(format!("invalid address {addr}"))
			}
		}
	}
}
