// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sources of fresh WireGuard key material.

use crate::keys::{KeyError, WgKeyPair, WgPresharedKey, WgPrivateKey, WgPublicKey};
use crate::tool::{run_wg, WgToolError, DEFAULT_WG_BINARY};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug)]
pub enum CredentialError {
	#[error("wg tool error: {0}")]
	Tool(#[from] WgToolError),

	#[error("wg tool returned malformed key: {0}")]
	MalformedKey(#[from] KeyError),
}

pub type Result<T> = std::result::Result<T, CredentialError>;

#[async_trait]
pub trait CredentialSource: Send + Sync {
	async fn generate_key_pair(&self) -> Result<WgKeyPair>;

	async fn derive_public_key(&self, private_key: &WgPrivateKey) -> Result<WgPublicKey>;

	async fn generate_preshared_key(&self) -> Result<WgPresharedKey>;
}

/// In-process key generation with x25519-dalek and the OS RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalCredentials;

#[async_trait]
impl CredentialSource for LocalCredentials {
	async fn generate_key_pair(&self) -> Result<WgKeyPair> {
		Ok(WgKeyPair::generate())
	}

	async fn derive_public_key(&self, private_key: &WgPrivateKey) -> Result<WgPublicKey> {
		Ok(private_key.public_key())
	}

	async fn generate_preshared_key(&self) -> Result<WgPresharedKey> {
		Ok(WgPresharedKey::generate())
	}
}

/// Shells out to `wg genkey`, `wg pubkey` and `wg genpsk`.
#[derive(Debug, Clone)]
pub struct WgToolCredentials {
	binary: String,
}

impl WgToolCredentials {
	pub fn new(binary: impl Into<String>) -> Self {
		Self {
			binary: binary.into(),
		}
	}
}

impl Default for WgToolCredentials {
	fn default() -> Self {
		Self::new(DEFAULT_WG_BINARY)
	}
}

#[async_trait]
impl CredentialSource for WgToolCredentials {
	#[instrument(skip(self), fields(binary = %self.binary))]
	async fn generate_key_pair(&self) -> Result<WgKeyPair> {
		let private = run_wg(&self.binary, &["genkey"], None).await?;
		let private = WgPrivateKey::from_base64(&private)?;
		let public = self.derive_public_key(&private).await?;
		debug!(public_key = %public, "generated key pair");
		Ok(WgKeyPair::from_private_key(private))
	}

	#[instrument(skip(self, private_key), fields(binary = %self.binary))]
	async fn derive_public_key(&self, private_key: &WgPrivateKey) -> Result<WgPublicKey> {
		let encoded = private_key.to_base64();
		let public = run_wg(&self.binary, &["pubkey"], Some(encoded.expose())).await?;
		Ok(WgPublicKey::from_base64(&public)?)
	}

	#[instrument(skip(self), fields(binary = %self.binary))]
	async fn generate_preshared_key(&self) -> Result<WgPresharedKey> {
		let psk = run_wg(&self.binary, &["genpsk"], None).await?;
		Ok(WgPresharedKey::from_base64(&psk)?)
	}
}
