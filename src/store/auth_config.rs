//! App credential fingerprinting.
//!
//! Tokens are only valid for the consumer key pair that issued them. The store keeps a
//! fingerprint of the key pair it last ran with; when the app ships with a different pair, every
//! persisted session is purged before anything is loaded.

// self
use crate::{
	_prelude::*,
	auth::AppCredentials,
	store::{BlobKey, BlobKind, CredentialPersistence, StoreError},
};

const FINGERPRINT_KEY: &str = "consumer";

/// Result of reconciling the persisted fingerprint with the running app.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthConfigOutcome {
	/// No fingerprint was stored; it has been recorded and nothing was purged.
	FirstRun,
	/// The fingerprint matches.
	Unchanged,
	/// The fingerprint changed; persisted credentials were removed.
	Purged {
		/// Number of credential blobs deleted.
		removed: usize,
	},
}

/// Key under which the fingerprint is persisted.
pub fn fingerprint_key() -> BlobKey {
	BlobKey { kind: BlobKind::AuthConfig, identity: FINGERPRINT_KEY.into() }
}

pub(crate) fn reconcile(
	persistence: &dyn CredentialPersistence,
	app: &AppCredentials,
) -> Result<AuthConfigOutcome, StoreError> {
	let key = fingerprint_key();
	let current = app.fingerprint();
	let outcome = match persistence.get(&key)? {
		None => AuthConfigOutcome::FirstRun,
		Some(stored) if stored == current.as_bytes() => return Ok(AuthConfigOutcome::Unchanged),
		Some(_) => AuthConfigOutcome::Purged { removed: purge(persistence)? },
	};

	persistence.put(&key, current.as_bytes())?;

	Ok(outcome)
}

fn purge(persistence: &dyn CredentialPersistence) -> Result<usize, StoreError> {
	let mut removed = 0;

	for kind in [BlobKind::Guest, BlobKind::User] {
		for key in persistence.keys(kind)? {
			if persistence.delete(&key)? {
				removed += 1;
			}
		}
	}

	Ok(removed)
}
