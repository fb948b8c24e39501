//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use parking_lot::Mutex;
// self
use auth_pipeline::{
	auth::{AppCredentials, CorrelationId, Credential, CredentialKind, Identity, UserId},
	error::{Result, TransportError},
	http::{ApiRequest, ApiResponse, GUEST_TOKEN_HEADER, StatusCode, Transport, TransportFuture, header},
	pipeline::Pipeline,
	refresh::{Exchange, RefreshFuture, RefreshStrategies, RefreshStrategy},
	store::{CredentialStore, MemoryPersistence},
	url::Url,
};

type Responder = Box<dyn Fn(&ApiRequest, usize) -> Result<ApiResponse, TransportError> + Send + Sync>;
type Producer = Box<dyn Fn(&Identity, usize) -> Result<Credential> + Send + Sync>;

/// Transport answering from a closure and recording every call.
pub struct ScriptedTransport {
	responder: Responder,
	latency: Option<StdDuration>,
	calls: Mutex<Vec<ApiRequest>>,
	cancelled: Mutex<Vec<CorrelationId>>,
}
impl ScriptedTransport {
	pub fn new(
		responder: impl Fn(&ApiRequest, usize) -> Result<ApiResponse, TransportError>
		+ 'static
		+ Send
		+ Sync,
	) -> Self {
		Self {
			responder: Box::new(responder),
			latency: None,
			calls: Mutex::new(Vec::new()),
			cancelled: Mutex::new(Vec::new()),
		}
	}

	/// Always answers `200 OK`.
	pub fn ok() -> Self {
		Self::new(|_, _| Ok(ok_response()))
	}

	pub fn with_latency(mut self, latency: StdDuration) -> Self {
		self.latency = Some(latency);

		self
	}

	pub fn calls(&self) -> Vec<ApiRequest> {
		self.calls.lock().clone()
	}

	pub fn call_count(&self) -> usize {
		self.calls.lock().len()
	}

	pub fn cancelled(&self) -> Vec<CorrelationId> {
		self.cancelled.lock().clone()
	}
}
impl Transport for ScriptedTransport {
	fn execute(&self, request: ApiRequest, _: CorrelationId) -> TransportFuture<'_> {
		Box::pin(async move {
			let index = {
				let mut calls = self.calls.lock();

				calls.push(request.clone());

				calls.len() - 1
			};

			if let Some(latency) = self.latency {
				tokio::time::sleep(latency).await;
			}

			(self.responder)(&request, index)
		})
	}

	fn cancel(&self, correlation: CorrelationId) {
		self.cancelled.lock().push(correlation);
	}
}

/// Refresh strategy producing credentials from a closure; a 401 marks the credential stale.
pub struct ScriptedRefreshStrategy {
	kind: CredentialKind,
	producer: Producer,
	latency: Option<StdDuration>,
	calls: AtomicUsize,
	refreshed: Mutex<Vec<Identity>>,
}
impl ScriptedRefreshStrategy {
	pub fn new(
		kind: CredentialKind,
		producer: impl Fn(&Identity, usize) -> Result<Credential> + 'static + Send + Sync,
	) -> Self {
		Self {
			kind,
			producer: Box::new(producer),
			latency: None,
			calls: AtomicUsize::new(0),
			refreshed: Mutex::new(Vec::new()),
		}
	}

	/// Guest strategy issuing `guest-1`, `guest-2`, ... on successive calls.
	pub fn numbered_guest() -> Self {
		Self::new(CredentialKind::Guest, |_, call| {
			Ok(Credential::guest("app-bearer", format!("guest-{}", call + 1)))
		})
	}

	/// User strategy issuing `<user>-token-1`, `<user>-token-2`, ... on successive calls.
	pub fn numbered_user() -> Self {
		Self::new(CredentialKind::User, |identity, call| match identity.user() {
			Some(user) => Ok(Credential::user(
				user.clone(),
				format!("{user}-token-{}", call + 1),
				format!("{user}-secret"),
			)),
			None => panic!("User strategy received a guest identity."),
		})
	}

	pub fn with_latency(mut self, latency: StdDuration) -> Self {
		self.latency = Some(latency);

		self
	}

	pub fn call_count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn refreshed(&self) -> Vec<Identity> {
		self.refreshed.lock().clone()
	}
}
impl RefreshStrategy for ScriptedRefreshStrategy {
	fn kind(&self) -> CredentialKind {
		self.kind
	}

	fn is_stale(&self, exchange: Exchange<'_>) -> bool {
		matches!(exchange, Exchange::Response(response) if response.status == StatusCode::UNAUTHORIZED)
	}

	fn refresh<'a>(&'a self, identity: &'a Identity, _: Option<&'a Credential>) -> RefreshFuture<'a> {
		Box::pin(async move {
			let call = self.calls.fetch_add(1, Ordering::SeqCst);

			self.refreshed.lock().push(identity.clone());

			if let Some(latency) = self.latency {
				tokio::time::sleep(latency).await;
			}

			(self.producer)(identity, call)
		})
	}
}

/// Scripted collaborators wired into a store and a pipeline.
pub struct Harness {
	pub transport: Arc<ScriptedTransport>,
	pub guest: Arc<ScriptedRefreshStrategy>,
	pub user: Arc<ScriptedRefreshStrategy>,
	pub store: Arc<CredentialStore>,
	pub pipeline: Pipeline,
}
impl Harness {
	pub fn new(
		transport: ScriptedTransport,
		guest: ScriptedRefreshStrategy,
		user: ScriptedRefreshStrategy,
	) -> Self {
		let transport = Arc::new(transport);
		let guest = Arc::new(guest);
		let user = Arc::new(user);
		let strategies = RefreshStrategies::new(guest.clone(), user.clone());
		let store =
			Arc::new(CredentialStore::new(Arc::new(MemoryPersistence::default()), strategies));
		let pipeline = Pipeline::builder(app(), transport.clone())
			.build()
			.expect("Pipeline should build inside a Tokio runtime.");

		Self { transport, guest, user, store, pipeline }
	}
}

pub fn app() -> AppCredentials {
	AppCredentials::new("consumer-key", "consumer-secret")
}

pub fn user(id: &str) -> UserId {
	UserId::new(id).expect("User fixture should be valid.")
}

pub fn request() -> ApiRequest {
	ApiRequest::get(url("https://api.example.com/1.1/statuses/home_timeline.json?count=5"))
}

pub fn url(value: &str) -> Url {
	Url::parse(value).expect("URL fixture should parse.")
}

pub fn ok_response() -> ApiResponse {
	ApiResponse::new(StatusCode::OK, r#"{"ok":true}"#)
}

pub fn unauthorized() -> ApiResponse {
	ApiResponse::new(
		StatusCode::UNAUTHORIZED,
		r#"{"errors":[{"code":89,"message":"Invalid or expired token."}]}"#,
	)
}

/// Guest token the request was signed with, if any.
pub fn guest_token(request: &ApiRequest) -> Option<String> {
	request.headers.get(GUEST_TOKEN_HEADER).and_then(|value| value.to_str().ok()).map(str::to_owned)
}

/// Authorization header the request was signed with, if any.
pub fn authorization(request: &ApiRequest) -> Option<String> {
	request
		.headers
		.get(header::AUTHORIZATION)
		.and_then(|value| value.to_str().ok())
		.map(str::to_owned)
}

/// Polls `check` for up to two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
	for _ in 0..200 {
		if check() {
			return true;
		}

		tokio::time::sleep(StdDuration::from_millis(10)).await;
	}

	check()
}
