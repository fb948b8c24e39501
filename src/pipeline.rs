//! The authenticated request pipeline.
//!
//! [`Pipeline::enqueue`] takes an unsigned request, routes it to the guest or user queue, signs
//! it (refreshing the credential when needed), executes it over the [`Transport`], and applies
//! the single-retry rule:
//!
//! - `RetryableAuthFailure` on attempt 1: mark the signing credential stale (if still current)
//!   and resubmit [`Package::copy_for_retry`].
//! - `RetryableAuthFailure` on attempt 2: deliver [`Error::AuthenticationFailed`].
//! - Anything else: deliver as-is.
//!
//! Every request's callback runs exactly once, on a runtime worker thread.

pub mod operation;
pub mod package;
pub mod validator;

mod queue;

pub use operation::{OperationState, SignedRequest};
pub use package::Package;
pub use validator::{DefaultResponseValidator, ResponseValidator, Validation};

// crates.io
use tokio::{runtime::Handle, sync::oneshot};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	auth::{AppCredentials, CorrelationId, CredentialKind, Identity, UserId},
	error::ConfigError,
	http::{ApiRequest, ApiResponse, Transport},
	obs::{self, PipelineStage, StageOutcome},
	pipeline::{operation::SigningOperation, queue::PipelineQueue},
	service::PipelineConfig,
	signing::{DefaultRequestSigner, RequestSigner, ServerClock},
	store::CredentialStore,
};

/// Caller-side handle of an enqueued request.
#[derive(Clone, Debug)]
pub struct RequestHandle {
	correlation: CorrelationId,
	cancellation: CancellationToken,
}
impl RequestHandle {
	/// Cancels the request. Idempotent; a request already delivered is unaffected.
	pub fn cancel(&self) {
		self.cancellation.cancel();
	}

	/// Returns `true` once [`cancel`](Self::cancel) was called.
	pub fn is_cancelled(&self) -> bool {
		self.cancellation.is_cancelled()
	}

	/// Correlation id shared by every attempt of the request.
	pub fn correlation_id(&self) -> CorrelationId {
		self.correlation
	}
}

/// Signs, sends, and retries authenticated requests. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Pipeline {
	inner: Arc<PipelineInner>,
}
impl Pipeline {
	/// Starts building a pipeline for `app` over `transport`.
	pub fn builder(app: AppCredentials, transport: Arc<dyn Transport>) -> PipelineBuilder {
		PipelineBuilder {
			app,
			transport,
			signer: None,
			validator: None,
			clock: ServerClock::default(),
			config: PipelineConfig::default(),
			runtime: None,
		}
	}

	/// Enqueues `request` for `user` (guest when `None`) and returns immediately.
	///
	/// `callback` receives the response, a terminal error, or [`Error::Cancelled`], exactly once.
	pub fn enqueue<F>(
		&self,
		request: ApiRequest,
		store: &Arc<CredentialStore>,
		user: Option<UserId>,
		callback: F,
	) -> RequestHandle
	where
		F: 'static + Send + FnOnce(Result<ApiResponse>),
	{
		let cancellation = CancellationToken::new();
		let package =
			Package::new(request, store.clone(), Identity::from_user(user), cancellation.clone());
		let handle = RequestHandle { correlation: package.correlation_id(), cancellation };
		let inner = self.inner.clone();

		self.inner.runtime.spawn(async move {
			let result = inner.run_package(package).await;

			callback(result);
		});

		handle
	}

	/// Async convenience over [`enqueue`](Self::enqueue); dropping the future cancels the request.
	pub async fn send(
		&self,
		request: ApiRequest,
		store: &Arc<CredentialStore>,
		user: Option<UserId>,
	) -> Result<ApiResponse> {
		let (sender, receiver) = oneshot::channel();
		let handle = self.enqueue(request, store, user, move |result| {
			let _ = sender.send(result);
		});
		let _cancel_on_drop = handle.cancellation.drop_guard();

		receiver.await.unwrap_or(Err(Error::PipelineShutdown))
	}

	/// App credentials requests are signed for.
	pub fn app(&self) -> &AppCredentials {
		&self.inner.app
	}

	/// Server clock offset learned from response `Date` headers.
	///
	/// Share it with [`UserRefreshStrategy::with_clock`](crate::refresh::UserRefreshStrategy::with_clock)
	/// so verification calls are stamped with the same correction.
	pub fn clock(&self) -> &ServerClock {
		&self.inner.clock
	}
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
	app: AppCredentials,
	transport: Arc<dyn Transport>,
	signer: Option<Arc<dyn RequestSigner>>,
	validator: Option<Arc<dyn ResponseValidator>>,
	clock: ServerClock,
	config: PipelineConfig,
	runtime: Option<Handle>,
}
impl PipelineBuilder {
	/// Replaces the [`DefaultRequestSigner`].
	pub fn signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
		self.signer = Some(signer);

		self
	}

	/// Replaces the [`DefaultResponseValidator`].
	pub fn validator(mut self, validator: Arc<dyn ResponseValidator>) -> Self {
		self.validator = Some(validator);

		self
	}

	/// Shares `clock` instead of a fresh one. The default signer stamps user requests with it;
	/// every response's `Date` header updates it.
	pub fn clock(mut self, clock: ServerClock) -> Self {
		self.clock = clock;

		self
	}

	/// Sets worker-pool sizing.
	pub fn config(mut self, config: PipelineConfig) -> Self {
		self.config = config;

		self
	}

	/// Runs workers and callbacks on `runtime` instead of the current one.
	pub fn runtime(mut self, runtime: Handle) -> Self {
		self.runtime = Some(runtime);

		self
	}

	/// Validates the configuration and spawns the queue workers.
	pub fn build(self) -> Result<Pipeline> {
		self.config.validate()?;

		let runtime = match self.runtime {
			Some(runtime) => runtime,
			None => Handle::try_current().map_err(|_| ConfigError::MissingRuntime)?,
		};
		let guest = PipelineQueue::spawn(
			CredentialKind::Guest,
			self.config.concurrency(CredentialKind::Guest),
			&runtime,
		);
		let user = PipelineQueue::spawn(
			CredentialKind::User,
			self.config.concurrency(CredentialKind::User),
			&runtime,
		);
		let clock = self.clock;
		let inner = PipelineInner {
			transport: self.transport,
			signer: self.signer.unwrap_or_else(|| {
				Arc::new(DefaultRequestSigner::new().with_clock(clock.clone()))
			}),
			validator: self.validator.unwrap_or_else(|| Arc::new(DefaultResponseValidator)),
			app: self.app,
			clock,
			guest,
			user,
			runtime,
		};

		Ok(Pipeline { inner: Arc::new(inner) })
	}
}
impl Debug for PipelineBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PipelineBuilder")
			.field("app", &self.app)
			.field("custom_signer", &self.signer.is_some())
			.field("custom_validator", &self.validator.is_some())
			.field("config", &self.config)
			.finish()
	}
}

struct PipelineInner {
	transport: Arc<dyn Transport>,
	signer: Arc<dyn RequestSigner>,
	validator: Arc<dyn ResponseValidator>,
	app: AppCredentials,
	clock: ServerClock,
	guest: PipelineQueue,
	user: PipelineQueue,
	runtime: Handle,
}
impl PipelineInner {
	fn queue(&self, kind: CredentialKind) -> &PipelineQueue {
		match kind {
			CredentialKind::Guest => &self.guest,
			CredentialKind::User => &self.user,
		}
	}

	async fn run_package(&self, package: Package) -> Result<ApiResponse> {
		const STAGE: PipelineStage = PipelineStage::Send;

		let result = obs::in_stage(STAGE, "run_package", self.drive_package(package)).await;

		if matches!(result, Err(Error::Cancelled)) {
			obs::record_stage_outcome(STAGE, StageOutcome::Cancelled);
		}

		result
	}

	async fn drive_package(&self, mut package: Package) -> Result<ApiResponse> {
		const STAGE: PipelineStage = PipelineStage::Send;

		loop {
			let kind = package.identity().kind();
			let ticket = self.queue(kind).submit(SigningOperation::new(
				&package,
				self.signer.clone(),
				self.app.clone(),
			));
			let signed = tokio::select! {
				biased;
				_ = package.cancellation().cancelled() => None,
				signed = ticket => Some(signed),
			};
			let signed = signed.ok_or(Error::Cancelled)??;

			if package.cancellation().is_cancelled() {
				return Err(Error::Cancelled);
			}

			let correlation = package.correlation_id();

			obs::record_stage_outcome(STAGE, StageOutcome::Attempt);
			obs::debug_event!(
				correlation = %correlation,
				attempt = package.attempt(),
				identity = %package.identity(),
				"sending signed request"
			);

			let request = signed.request;
			// Nothing reaches the transport until the select first polls this branch.
			let exchange = tokio::select! {
				biased;
				_ = package.cancellation().cancelled() => None,
				exchange = async { self.transport.execute(request, correlation).await } =>
					Some(exchange),
			};
			let Some(exchange) = exchange else {
				self.transport.cancel(correlation);

				return Err(Error::Cancelled);
			};

			if let Ok(response) = &exchange {
				self.clock.sync(&response.headers);
			}

			let strategy = package.store().strategy_for(kind);

			match self.validator.classify(exchange, strategy.as_ref()) {
				Validation::Success(response) => {
					obs::record_stage_outcome(STAGE, StageOutcome::Success);

					return Ok(response);
				},
				Validation::Terminal(error) => {
					obs::record_stage_outcome(STAGE, StageOutcome::Failure);

					return Err(error);
				},
				Validation::RetryableAuthFailure if package.can_retry() => {
					obs::record_stage_outcome(STAGE, StageOutcome::Retry);

					let _marked =
						package.store().mark_stale_if_current(package.identity(), &signed.credential);

					obs::debug_event!(correlation = %correlation, outcome = ?_marked, "retrying after auth failure");

					package = package.copy_for_retry();
				},
				Validation::RetryableAuthFailure => {
					obs::record_stage_outcome(STAGE, StageOutcome::Failure);
					obs::warn_event!(correlation = %correlation, "authentication failed after retry");

					return Err(Error::AuthenticationFailed { attempts: package.attempt() });
				},
			}
		}
	}
}
impl Debug for PipelineInner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PipelineInner")
			.field("app", &self.app)
			.field("clock", &self.clock)
			.field("guest", &self.guest)
			.field("user", &self.user)
			.finish()
	}
}
