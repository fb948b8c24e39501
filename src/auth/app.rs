//! The app's consumer key pair.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::TokenSecret};

/// Consumer key/secret identifying the app; immutable for the process lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct AppCredentials {
	consumer_key: String,
	consumer_secret: TokenSecret,
}
impl AppCredentials {
	/// Wraps the consumer key pair.
	pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
		Self { consumer_key: consumer_key.into(), consumer_secret: TokenSecret::new(consumer_secret) }
	}

	/// Public consumer key.
	pub fn consumer_key(&self) -> &str {
		&self.consumer_key
	}

	/// Consumer secret.
	pub fn consumer_secret(&self) -> &TokenSecret {
		&self.consumer_secret
	}

	/// Stable base64 (no padding) SHA-256 digest of the key pair.
	///
	/// Persisted next to credentials so a store opened with a different key pair can purge
	/// tokens that were issued to another app.
	pub fn fingerprint(&self) -> String {
		let mut hasher = Sha256::new();

		hasher.update(self.consumer_key.as_bytes());
		hasher.update([0]);
		hasher.update(self.consumer_secret.expose().as_bytes());

		STANDARD_NO_PAD.encode(hasher.finalize())
	}
}
impl Debug for AppCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AppCredentials")
			.field("consumer_key", &self.consumer_key)
			.field("consumer_secret", &self.consumer_secret)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn fingerprint_is_stable_and_key_sensitive() {
		let a = AppCredentials::new("key-a", "secret");
		let b = AppCredentials::new("key-b", "secret");

		assert_eq!(a.fingerprint(), AppCredentials::new("key-a", "secret").fingerprint());
		assert_ne!(a.fingerprint(), b.fingerprint());
		assert_ne!(
			AppCredentials::new("ab", "c").fingerprint(),
			AppCredentials::new("a", "bc").fingerprint()
		);
	}

	#[test]
	fn debug_redacts_secret() {
		let app = AppCredentials::new("key", "very-secret");

		assert!(!format!("{app:?}").contains("very-secret"));
	}
}
