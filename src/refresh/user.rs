//! User session "refresh": OAuth 1.0a tokens do not expire, so a stale user credential is
//! re-verified instead of re-issued.

// self
use crate::{
	_prelude::*,
	auth::{AppCredentials, CorrelationId, Credential, CredentialKind, Identity},
	http::{ApiRequest, StatusCode, Transport},
	obs,
	refresh::{Exchange, RefreshFuture, RefreshStrategy, guest::INVALID_OR_EXPIRED_TOKEN},
	service::ServiceDescriptor,
	signing::{DefaultRequestSigner, RequestSigner, ServerClock},
};

/// Re-validates a user's token pair against `account/verify_credentials.json`.
pub struct UserRefreshStrategy {
	app: AppCredentials,
	transport: Arc<dyn Transport>,
	verify: Url,
	signer: Arc<dyn RequestSigner>,
	clock: ServerClock,
}
impl UserRefreshStrategy {
	/// Creates a strategy signing verification calls with [`DefaultRequestSigner`].
	pub fn new(
		app: &AppCredentials,
		descriptor: &ServiceDescriptor,
		transport: Arc<dyn Transport>,
	) -> Self {
		Self {
			app: app.clone(),
			transport,
			verify: descriptor.endpoints.verify_credentials.clone(),
			signer: Arc::new(DefaultRequestSigner::new()),
			clock: ServerClock::default(),
		}
	}

	/// Shares `clock` with the pipeline: verification calls are stamped with it and their
	/// `Date` headers update it.
	pub fn with_clock(mut self, clock: ServerClock) -> Self {
		self.signer = Arc::new(DefaultRequestSigner::new().with_clock(clock.clone()));
		self.clock = clock;

		self
	}

	/// Replaces the signer used for verification calls.
	pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
		self.signer = signer;

		self
	}
}
impl Debug for UserRefreshStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("UserRefreshStrategy").field("verify", &self.verify.as_str()).finish()
	}
}
impl RefreshStrategy for UserRefreshStrategy {
	fn kind(&self) -> CredentialKind {
		CredentialKind::User
	}

	fn is_stale(&self, exchange: Exchange<'_>) -> bool {
		match exchange {
			Exchange::Response(response) =>
				response.status == StatusCode::UNAUTHORIZED
					|| response.has_error_code(INVALID_OR_EXPIRED_TOKEN),
			Exchange::Failed(_) => false,
		}
	}

	fn refresh<'a>(
		&'a self,
		identity: &'a Identity,
		stale: Option<&'a Credential>,
	) -> RefreshFuture<'a> {
		Box::pin(async move {
			let (Some(user), Some(current)) = (identity.user(), stale) else {
				return Err(Error::NoCredentialAvailable { kind: CredentialKind::User });
			};
			let request = self.signer.sign(&ApiRequest::get(self.verify.clone()), current, &self.app)?;
			let response = self.transport.execute(request, CorrelationId::next()).await?;

			self.clock.sync(&response.headers);

			if response.is_success() {
				return Ok(current.reissued());
			}
			if self.is_stale(Exchange::Response(&response)) {
				obs::warn_event!(user = %user, "user token rejected during verification");

				return Err(Error::ReauthenticationRequired { user: user.clone() });
			}

			Err(Error::api(&response))
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::UserId,
		http::{ApiResponse, HeaderValue, TransportFuture, header},
	};

	struct Verifier {
		status: StatusCode,
		body: &'static str,
		seen: Mutex<Vec<ApiRequest>>,
	}
	impl Transport for Verifier {
		fn execute(&self, request: ApiRequest, _: CorrelationId) -> TransportFuture<'_> {
			self.seen.lock().push(request);

			let response = ApiResponse::new(self.status, self.body);

			Box::pin(async move { Ok(response) })
		}
	}

	struct Dated;
	impl Transport for Dated {
		fn execute(&self, _: ApiRequest, _: CorrelationId) -> TransportFuture<'_> {
			let mut response = ApiResponse::new(StatusCode::OK, "{}");

			response
				.headers
				.insert(header::DATE, HeaderValue::from_static("Sun, 06 Nov 1994 08:49:37 GMT"));

			Box::pin(async move { Ok(response) })
		}
	}

	fn strategy(status: StatusCode, body: &'static str) -> (UserRefreshStrategy, Arc<Verifier>) {
		let transport = Arc::new(Verifier { status, body, seen: Mutex::new(Vec::new()) });
		let descriptor = ServiceDescriptor::twitter().expect("Default descriptor should build.");

		(
			UserRefreshStrategy::new(&AppCredentials::new("k", "s"), &descriptor, transport.clone()),
			transport,
		)
	}

	fn user_credential() -> (Identity, Credential) {
		let user = UserId::new("42").expect("User fixture should be valid.");
		let credential = Credential::user(user.clone(), "tok", "secret")
			.with_issued_at(OffsetDateTime::UNIX_EPOCH);

		(Identity::User(user), credential)
	}

	#[tokio::test]
	async fn verified_tokens_are_reissued() {
		let (strategy, transport) = strategy(StatusCode::OK, r#"{"id_str":"42"}"#);
		let (identity, credential) = user_credential();
		let renewed = strategy
			.refresh(&identity, Some(&credential))
			.await
			.expect("Verification should succeed.");

		assert_eq!(renewed.material(), credential.material());
		assert!(renewed.issued_at() > credential.issued_at());

		let seen = transport.seen.lock();

		assert!(
			seen[0]
				.headers
				.get(header::AUTHORIZATION)
				.and_then(|v| v.to_str().ok())
				.is_some_and(|v| v.starts_with("OAuth "))
		);
	}

	#[tokio::test]
	async fn rejected_tokens_require_reauthentication() {
		let (strategy, _) = strategy(StatusCode::UNAUTHORIZED, r#"{"errors":[{"code":89}]}"#);
		let (identity, credential) = user_credential();
		let err = strategy
			.refresh(&identity, Some(&credential))
			.await
			.expect_err("Rejected tokens should fail.");

		assert!(matches!(err, Error::ReauthenticationRequired { ref user } if user.as_ref() == "42"));
	}

	#[tokio::test]
	async fn verification_responses_sync_the_shared_clock() {
		let transport = Arc::new(Dated);
		let descriptor = ServiceDescriptor::twitter().expect("Default descriptor should build.");
		let clock = ServerClock::default();
		let strategy =
			UserRefreshStrategy::new(&AppCredentials::new("k", "s"), &descriptor, transport)
				.with_clock(clock.clone());
		let (identity, credential) = user_credential();

		strategy.refresh(&identity, Some(&credential)).await.expect("Verification should succeed.");

		// The fixture date lies decades in the past.
		assert!(clock.offset() < -Duration::days(365));
	}

	#[tokio::test]
	async fn missing_credentials_cannot_be_verified() {
		let (strategy, transport) = strategy(StatusCode::OK, "{}");
		let (identity, _) = user_credential();
		let err = strategy.refresh(&identity, None).await.expect_err("Nothing to verify.");

		assert!(matches!(err, Error::NoCredentialAvailable { kind: CredentialKind::User }));
		assert!(transport.seen.lock().is_empty());
	}

	#[tokio::test]
	async fn server_errors_stay_terminal() {
		let (strategy, _) = strategy(StatusCode::SERVICE_UNAVAILABLE, "");
		let (identity, credential) = user_credential();
		let err = strategy
			.refresh(&identity, Some(&credential))
			.await
			.expect_err("Outages should fail verification.");

		assert!(matches!(err, Error::Api { status: 503, .. }));
	}
}
