//! Guest session refresh: app-only bearer token, then guest token activation.

// self
use crate::{
	_prelude::*,
	auth::{AppCredentials, CorrelationId, Credential, CredentialKind, Identity, TokenSecret},
	error::ProtocolError,
	http::{ApiRequest, StatusCode, Transport, header},
	oauth::AppTokenClient,
	obs,
	refresh::{Exchange, RefreshFuture, RefreshStrategy},
	service::ServiceDescriptor,
};

/// API error code for an invalid or expired token.
pub const INVALID_OR_EXPIRED_TOKEN: u32 = 89;
/// API error code for a guest token the server no longer accepts.
pub const BAD_GUEST_TOKEN: u32 = 239;

#[derive(Deserialize)]
struct GuestActivation {
	guest_token: String,
}

/// Refreshes the guest session through `client_credentials` + `guest/activate.json`.
pub struct GuestRefreshStrategy {
	app_tokens: AppTokenClient,
	transport: Arc<dyn Transport>,
	activate: Url,
	expiry_hint: Duration,
}
impl GuestRefreshStrategy {
	/// Guest tokens older than this are refreshed before use.
	pub const DEFAULT_EXPIRY_HINT: Duration = Duration::hours(1);

	/// Creates a strategy for `app` against `descriptor`'s endpoints.
	pub fn new(
		app: &AppCredentials,
		descriptor: &ServiceDescriptor,
		transport: Arc<dyn Transport>,
	) -> Result<Self> {
		let app_tokens =
			AppTokenClient::new(app, &descriptor.endpoints.app_token, transport.clone())?;

		Ok(Self {
			app_tokens,
			transport,
			activate: descriptor.endpoints.guest_activate.clone(),
			expiry_hint: Self::DEFAULT_EXPIRY_HINT,
		})
	}

	/// Overrides the age after which a guest credential is treated as probably expired.
	pub fn with_expiry_hint(mut self, hint: Duration) -> Self {
		self.expiry_hint = if hint.is_negative() { Duration::ZERO } else { hint };

		self
	}

	async fn activate(&self, bearer: &TokenSecret) -> Result<TokenSecret> {
		let request = ApiRequest::post(self.activate.clone())
			.with_header(header::AUTHORIZATION, &format!("Bearer {}", bearer.expose()))?;
		let response = self.transport.execute(request, CorrelationId::next()).await?;

		if !response.is_success() {
			return Err(Error::api(&response));
		}

		let activation = response.json::<GuestActivation>()?;

		if activation.guest_token.is_empty() {
			return Err(ProtocolError::TokenEndpoint {
				message: "guest activation returned an empty token".into(),
				status: Some(response.status.as_u16()),
			}
			.into());
		}

		Ok(TokenSecret::new(activation.guest_token))
	}
}
impl Debug for GuestRefreshStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("GuestRefreshStrategy")
			.field("activate", &self.activate.as_str())
			.field("expiry_hint", &self.expiry_hint)
			.finish()
	}
}
impl RefreshStrategy for GuestRefreshStrategy {
	fn kind(&self) -> CredentialKind {
		CredentialKind::Guest
	}

	fn is_stale(&self, exchange: Exchange<'_>) -> bool {
		match exchange {
			Exchange::Response(response) =>
				response.status == StatusCode::UNAUTHORIZED
					|| response.has_error_code(INVALID_OR_EXPIRED_TOKEN)
					|| response.has_error_code(BAD_GUEST_TOKEN),
			Exchange::Failed(_) => false,
		}
	}

	fn refresh<'a>(
		&'a self,
		_identity: &'a Identity,
		_stale: Option<&'a Credential>,
	) -> RefreshFuture<'a> {
		Box::pin(async move {
			let bearer = self.app_tokens.fetch_app_token().await?;
			let guest_token = self.activate(&bearer).await?;

			obs::debug_event!("guest token activated");

			Ok(Credential::guest(bearer.expose(), guest_token.expose()))
		})
	}

	fn probably_expired(&self, credential: &Credential, now: OffsetDateTime) -> bool {
		now - credential.issued_at() >= self.expiry_hint
	}
}
