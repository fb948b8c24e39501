//! One caller request as it travels through the pipeline.

// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	auth::{CorrelationId, Identity},
	http::ApiRequest,
	store::CredentialStore,
};

/// Unsigned request plus routing, attempt counter, and cancellation token.
///
/// Packages are never mutated once built; a retry is a new package from
/// [`copy_for_retry`](Package::copy_for_retry).
#[derive(Clone, Debug)]
pub struct Package {
	request: ApiRequest,
	store: Arc<CredentialStore>,
	identity: Identity,
	attempt: u8,
	correlation: CorrelationId,
	cancellation: CancellationToken,
}
impl Package {
	/// Highest attempt number; the retry after a refresh is attempt 2.
	pub const MAX_ATTEMPTS: u8 = 2;

	/// First attempt of a new request.
	pub fn new(
		request: ApiRequest,
		store: Arc<CredentialStore>,
		identity: Identity,
		cancellation: CancellationToken,
	) -> Self {
		Self {
			request,
			store,
			identity,
			attempt: 1,
			correlation: CorrelationId::next(),
			cancellation,
		}
	}

	/// Returns the next attempt of the same request; `self` is left untouched.
	pub fn copy_for_retry(&self) -> Self {
		Self { attempt: self.attempt.saturating_add(1), ..self.clone() }
	}

	/// Returns `true` while another attempt is allowed.
	pub fn can_retry(&self) -> bool {
		self.attempt < Self::MAX_ATTEMPTS
	}

	/// Unsigned request.
	pub fn request(&self) -> &ApiRequest {
		&self.request
	}

	/// Store the request is signed from.
	pub fn store(&self) -> &Arc<CredentialStore> {
		&self.store
	}

	/// Routing identity.
	pub fn identity(&self) -> &Identity {
		&self.identity
	}

	/// 1-based attempt number.
	pub fn attempt(&self) -> u8 {
		self.attempt
	}

	/// Correlation id shared by every attempt.
	pub fn correlation_id(&self) -> CorrelationId {
		self.correlation
	}

	/// Cancellation token shared by every attempt.
	pub fn cancellation(&self) -> &CancellationToken {
		&self.cancellation
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::{Credential, CredentialKind},
		refresh::{Exchange, RefreshFuture, RefreshStrategies, RefreshStrategy},
		store::MemoryPersistence,
	};

	struct Inert;
	impl RefreshStrategy for Inert {
		fn kind(&self) -> CredentialKind {
			CredentialKind::Guest
		}

		fn is_stale(&self, _: Exchange<'_>) -> bool {
			false
		}

		fn refresh<'a>(&'a self, _: &'a Identity, _: Option<&'a Credential>) -> RefreshFuture<'a> {
			Box::pin(async { Err(Error::NoCredentialAvailable { kind: CredentialKind::Guest }) })
		}
	}

	fn package() -> Package {
		let strategies = RefreshStrategies::new(Arc::new(Inert), Arc::new(Inert));
		let store =
			Arc::new(CredentialStore::new(Arc::new(MemoryPersistence::default()), strategies));
		let url = Url::parse("https://api.example.com/1.1/help.json").expect("URL should parse.");

		Package::new(ApiRequest::get(url), store, Identity::Guest, CancellationToken::new())
	}

	#[test]
	fn copy_for_retry_leaves_original_untouched() {
		let original = package();
		let retry = original.copy_for_retry();

		assert_eq!(original.attempt(), 1);
		assert_eq!(retry.attempt(), 2);
		assert!(original.can_retry());
		assert!(!retry.can_retry());
		assert!(!retry.copy_for_retry().can_retry());
		assert_eq!(retry.correlation_id(), original.correlation_id());
		assert_eq!(retry.request().url, original.request().url);
		assert!(Arc::ptr_eq(retry.store(), original.store()));

		original.cancellation().cancel();

		assert!(retry.cancellation().is_cancelled());
	}
}
