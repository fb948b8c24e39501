//! Request signing contracts and the default guest/user signer.

pub mod clock;
pub mod oauth1;

pub use clock::ServerClock;
pub use oauth1::{HmacSha1, OAuthNonce, OAuthToken, SignatureMath};

// self
use crate::{
	_prelude::*,
	auth::{AppCredentials, Credential, CredentialMaterial},
	http::{ApiRequest, GUEST_TOKEN_HEADER, HeaderName, header},
};

/// Attaches a credential's authorization state to an outbound request.
///
/// Signing is pure and synchronous: it never touches the store or the network and returns a
/// new request, leaving the input untouched so a retry can re-sign the original.
pub trait RequestSigner
where
	Self: 'static + Send + Sync,
{
	/// Returns a signed copy of `request`.
	fn sign(
		&self,
		request: &ApiRequest,
		credential: &Credential,
		app: &AppCredentials,
	) -> Result<ApiRequest>;
}

/// Guest requests get `Authorization: Bearer` plus `x-guest-token`; user requests get an
/// OAuth 1.0a `Authorization` header computed by the configured [`SignatureMath`], stamped
/// with the [`ServerClock`]'s corrected time.
pub struct DefaultRequestSigner {
	math: Arc<dyn SignatureMath>,
	clock: ServerClock,
	fixed_nonce: Option<OAuthNonce>,
}
impl DefaultRequestSigner {
	/// Signer using HMAC-SHA1 and a fresh nonce per request.
	pub fn new() -> Self {
		Self::with_math(HmacSha1)
	}

	/// Signer using custom signature math.
	pub fn with_math(math: impl SignatureMath) -> Self {
		Self { math: Arc::new(math), clock: ServerClock::default(), fixed_nonce: None }
	}

	/// Stamps `oauth_timestamp` with `clock` instead of a private, never-synced one.
	pub fn with_clock(mut self, clock: ServerClock) -> Self {
		self.clock = clock;

		self
	}

	/// Clock used for `oauth_timestamp`.
	pub fn clock(&self) -> &ServerClock {
		&self.clock
	}

	/// Pins the nonce and timestamp so signatures are reproducible.
	pub fn with_fixed_nonce(mut self, nonce: OAuthNonce) -> Self {
		self.fixed_nonce = Some(nonce);

		self
	}
}
impl Default for DefaultRequestSigner {
	fn default() -> Self {
		Self::new()
	}
}
impl Debug for DefaultRequestSigner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DefaultRequestSigner")
			.field("method", &self.math.method_name())
			.field("clock", &self.clock)
			.field("fixed_nonce", &self.fixed_nonce.is_some())
			.finish()
	}
}
impl RequestSigner for DefaultRequestSigner {
	fn sign(
		&self,
		request: &ApiRequest,
		credential: &Credential,
		app: &AppCredentials,
	) -> Result<ApiRequest> {
		let signed = match credential.material() {
			CredentialMaterial::Guest { access_token, guest_token } => request
				.clone()
				.with_header(header::AUTHORIZATION, &format!("Bearer {}", access_token.expose()))?
				.with_header(HeaderName::from_static(GUEST_TOKEN_HEADER), guest_token.expose())?,
			CredentialMaterial::User { token, token_secret } => {
				let nonce = self
					.fixed_nonce
					.clone()
					.unwrap_or_else(|| OAuthNonce::generate_at(self.clock.now()));
				let value = oauth1::authorization_header(
					self.math.as_ref(),
					request,
					app,
					OAuthToken { token: token.expose(), secret: token_secret.expose() },
					&nonce,
				)?;

				request.clone().with_header(header::AUTHORIZATION, &value)?
			},
		};

		Ok(signed)
	}
}
