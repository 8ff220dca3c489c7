// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Redacting wrapper for key material handled by wg2fa.
//!
//! Interface private keys, freshly minted client private keys and pre-shared
//! keys all pass through the provisioning workflow and end up near log
//! statements. Wrapping them in [`Secret`] keeps them out of `Debug`,
//! `Display` and serialized output, and zeroes the buffer on drop.
//!
//! ```
//! use wg2fa_common_secret::Secret;
//!
//! let psk = Secret::new("M2ZjNjYyZjQ1NmYxNGQ0ZmE2ZTE3ZjU0ZjEyMGE4ZTI=".to_string());
//! assert_eq!(format!("{psk}"), "[REDACTED]");
//! assert!(psk.expose().ends_with('='));
//! ```

use std::fmt;
use zeroize::Zeroize;

/// Placeholder written wherever a secret would otherwise be rendered.
pub const REDACTED: &str = "[REDACTED]";

/// Wraps a sensitive value. Access requires an explicit [`Secret::expose`].
pub struct Secret<T>
where
	T: Zeroize,
{
	inner: T,
}

pub type SecretString = Secret<String>;

impl<T> Secret<T>
where
	T: Zeroize,
{
	pub fn new(inner: T) -> Self {
		Self { inner }
	}

	/// Borrow the wrapped value. Every call site is a place the secret can leak.
	pub fn expose(&self) -> &T {
		&self.inner
	}

	/// Clone the inner value out; the wrapper itself is still zeroized on drop.
	pub fn into_inner(self) -> T
	where
		T: Clone,
	{
		self.inner.clone()
	}
}

impl<T> Drop for Secret<T>
where
	T: Zeroize,
{
	fn drop(&mut self) {
		self.inner.zeroize();
	}
}

impl<T> Clone for Secret<T>
where
	T: Zeroize + Clone,
{
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T> fmt::Debug for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Secret").field(&REDACTED).finish()
	}
}

impl<T> fmt::Display for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl<T> PartialEq for Secret<T>
where
	T: Zeroize + PartialEq,
{
	fn eq(&self, other: &Self) -> bool {
		self.inner == other.inner
	}
}

impl<T> Eq for Secret<T> where T: Zeroize + Eq {}

impl From<String> for Secret<String> {
	fn from(value: String) -> Self {
		Secret::new(value)
	}
}

#[cfg(feature = "serde")]
mod serde_impl {
	use super::{Secret, REDACTED};
	use serde::{Deserialize, Deserializer, Serialize, Serializer};
	use zeroize::Zeroize;

	impl<T> Serialize for Secret<T>
	where
		T: Zeroize,
	{
		fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
		where
			S: Serializer,
		{
			serializer.serialize_str(REDACTED)
		}
	}

	impl<'de, T> Deserialize<'de> for Secret<T>
	where
		T: Deserialize<'de> + Zeroize,
	{
		fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
		where
			D: Deserializer<'de>,
		{
			T::deserialize(deserializer).map(Secret::new)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	const PSK: &str = "YF4YWG1+uqRJe1uRnn+/S4JPALCfHUxEgug+W+XvNEY=";

	#[test]
	fn debug_and_display_hide_key_material() {
		let secret = Secret::new(PSK.to_string());
		assert_eq!(format!("{secret}"), REDACTED);
		assert!(!format!("{secret:?}").contains(PSK));
	}

	#[test]
	fn expose_and_into_inner_return_value() {
		let secret = Secret::new(PSK.to_string());
		assert_eq!(secret.expose(), PSK);
		assert_eq!(secret.clone().into_inner(), PSK);
	}

	#[test]
	fn option_of_secret_stays_redacted() {
		let secret: Option<SecretString> = Some(PSK.to_string().into());
		assert!(!format!("{secret:?}").contains(PSK));
	}

	#[cfg(feature = "serde")]
	#[test]
	fn serialize_is_redacted_deserialize_is_not() {
		let secret = Secret::new(PSK.to_string());
		let json = serde_json::to_string(&secret).unwrap();
		assert_eq!(json, format!("\"{REDACTED}\""));

		let parsed: SecretString = serde_json::from_str(&format!("\"{PSK}\"")).unwrap();
		assert_eq!(parsed.expose(), PSK);
	}

	proptest! {
		#[test]
		fn formatting_never_leaks(inner in "[A-Za-z0-9+/]{8,44}") {
			prop_assume!(!inner.contains("REDACTED"));
			prop_assume!(!inner.contains("Secret"));
			let secret = Secret::new(inner.clone());
			let display = format!("{secret}");
			let debug = format!("{secret:?}");
			prop_assert!(!display.contains(&inner));
			prop_assert!(!debug.contains(&inner));
		}
	}
}
