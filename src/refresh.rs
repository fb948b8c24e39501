//! Credential refresh strategies.
//!
//! A [`RefreshStrategy`] answers two questions for one credential class: "does this exchange mean
//! the credential went stale?" and "how do I obtain a replacement?". The store guarantees at most
//! one [`RefreshStrategy::refresh`] call per identity is in flight; strategies themselves are
//! stateless with respect to concurrency.

pub mod guest;
pub mod user;

mod metrics;

pub use guest::GuestRefreshStrategy;
pub use metrics::RefreshMetrics;
pub use user::UserRefreshStrategy;

// self
use crate::{
	_prelude::*,
	auth::{AppCredentials, Credential, CredentialKind, Identity},
	error::TransportError,
	http::{ApiResponse, Transport},
	service::ServiceDescriptor,
};

/// Boxed future returned by [`RefreshStrategy::refresh`].
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<Credential>> + 'a + Send>>;

/// Outcome of one transport exchange, as seen by stale classification.
#[derive(Clone, Copy, Debug)]
pub enum Exchange<'a> {
	/// The server answered.
	Response(&'a ApiResponse),
	/// The transport failed before a response arrived.
	Failed(&'a TransportError),
}

/// Per-kind refresh policy.
pub trait RefreshStrategy
where
	Self: 'static + Send + Sync,
{
	/// Credential class this strategy serves.
	fn kind(&self) -> CredentialKind;

	/// Returns `true` when the exchange proves the credential that signed it is no longer valid.
	fn is_stale(&self, exchange: Exchange<'_>) -> bool;

	/// Obtains a replacement credential for `identity`.
	///
	/// `stale` is the credential being replaced, when one exists.
	fn refresh<'a>(
		&'a self,
		identity: &'a Identity,
		stale: Option<&'a Credential>,
	) -> RefreshFuture<'a>;

	/// Cheap local guess that `credential` expired; the server's 401 stays authoritative.
	fn probably_expired(&self, _credential: &Credential, _now: OffsetDateTime) -> bool {
		false
	}
}

/// The guest and user strategies a store refreshes through.
#[derive(Clone)]
pub struct RefreshStrategies {
	/// Strategy for the guest session.
	pub guest: Arc<dyn RefreshStrategy>,
	/// Strategy shared by every user identity.
	pub user: Arc<dyn RefreshStrategy>,
}
impl RefreshStrategies {
	/// Pairs custom strategies.
	pub fn new(guest: Arc<dyn RefreshStrategy>, user: Arc<dyn RefreshStrategy>) -> Self {
		Self { guest, user }
	}

	/// Guest activation plus user verification against `descriptor`, both over `transport`.
	pub fn standard(
		app: &AppCredentials,
		descriptor: &ServiceDescriptor,
		transport: Arc<dyn Transport>,
	) -> Result<Self> {
		let guest = GuestRefreshStrategy::new(app, descriptor, transport.clone())?;
		let user = UserRefreshStrategy::new(app, descriptor, transport);

		Ok(Self::new(Arc::new(guest), Arc::new(user)))
	}

	/// Strategy serving `kind`.
	pub fn for_kind(&self, kind: CredentialKind) -> &Arc<dyn RefreshStrategy> {
		match kind {
			CredentialKind::Guest => &self.guest,
			CredentialKind::User => &self.user,
		}
	}
}
impl Debug for RefreshStrategies {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshStrategies")
			.field("guest", &self.guest.kind())
			.field("user", &self.user.kind())
			.finish()
	}
}
