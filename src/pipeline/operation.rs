//! Asynchronous signing state machine.
//!
//! ```text
//! Created -> ResolvingCredential -> (Refreshing)? -> Signing -> Done
//!                      \__________________\_____________\____-> Cancelled
//! ```
//!
//! The operation asks the store how to obtain a credential. A ready credential goes straight to
//! signing; otherwise the operation either leads the refresh (holding the store's lease) or parks
//! on the leader's outcome. Cancellation is checked at every transition and while parked.

// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	auth::{AppCredentials, Credential, CredentialKind, Identity},
	http::ApiRequest,
	obs::{self, PipelineStage, StageOutcome},
	pipeline::Package,
	signing::RequestSigner,
	store::{CredentialStore, RefreshLease, Resolution},
};

/// Phase of a [`SigningOperation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationState {
	/// Built, not started.
	Created,
	/// Asking the store for a usable credential.
	ResolvingCredential,
	/// Leading or waiting on a refresh.
	Refreshing,
	/// Computing the signed request.
	Signing,
	/// Finished successfully.
	Done,
	/// Stopped because the caller cancelled.
	Cancelled,
}
impl OperationState {
	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OperationState::Created => "created",
			OperationState::ResolvingCredential => "resolving_credential",
			OperationState::Refreshing => "refreshing",
			OperationState::Signing => "signing",
			OperationState::Done => "done",
			OperationState::Cancelled => "cancelled",
		}
	}
}

/// A request signed with a specific credential.
#[derive(Clone, Debug)]
pub struct SignedRequest {
	/// Request ready for the transport.
	pub request: ApiRequest,
	/// Credential that signed it; used to decide whether a rejection makes it stale.
	pub credential: Credential,
}

/// Resolves (refreshing if needed) and signs one attempt of a package.
pub(crate) struct SigningOperation {
	store: Arc<CredentialStore>,
	identity: Identity,
	request: ApiRequest,
	app: AppCredentials,
	signer: Arc<dyn RequestSigner>,
	cancellation: CancellationToken,
	state: OperationState,
}
impl SigningOperation {
	pub(crate) fn new(
		package: &Package,
		signer: Arc<dyn RequestSigner>,
		app: AppCredentials,
	) -> Self {
		Self {
			store: package.store().clone(),
			identity: package.identity().clone(),
			request: package.request().clone(),
			app,
			signer,
			cancellation: package.cancellation().clone(),
			state: OperationState::Created,
		}
	}

	pub(crate) async fn run(mut self) -> Result<SignedRequest> {
		const STAGE: PipelineStage = PipelineStage::Sign;

		obs::record_stage_outcome(STAGE, StageOutcome::Attempt);

		let result = obs::in_stage(STAGE, "signing_operation", self.drive()).await;

		match &result {
			Ok(_) => obs::record_stage_outcome(STAGE, StageOutcome::Success),
			Err(Error::Cancelled) => obs::record_stage_outcome(STAGE, StageOutcome::Cancelled),
			Err(_) => obs::record_stage_outcome(STAGE, StageOutcome::Failure),
		}

		result
	}

	async fn drive(&mut self) -> Result<SignedRequest> {
		let kind = self.identity.kind();

		self.transition(OperationState::ResolvingCredential)?;

		let credential = loop {
			match self.store.resolve(&self.identity, OffsetDateTime::now_utc()) {
				Resolution::Ready(credential) => break credential,
				Resolution::Missing => return Err(Error::NoCredentialAvailable { kind }),
				Resolution::Wait(waiter) => {
					self.transition(OperationState::Refreshing)?;

					let outcome = tokio::select! {
						biased;
						_ = self.cancellation.cancelled() => None,
						outcome = waiter.outcome() => Some(outcome),
					};

					match outcome {
						None => return Err(self.cancel()),
						Some(Some(Ok(credential))) => break credential,
						Some(Some(Err(cause))) => return Err(refresh_error(kind, cause)),
						// The leader gave up; resolve again.
						Some(None) => self.transition(OperationState::ResolvingCredential)?,
					}
				},
				Resolution::Refresh(lease) => {
					self.transition(OperationState::Refreshing)?;

					match self.lead_refresh(lease).await {
						Some(Ok(credential)) => break credential,
						Some(Err(cause)) => return Err(refresh_error(kind, cause)),
						None => return Err(self.cancel()),
					}
				},
			}
		};

		self.transition(OperationState::Signing)?;

		let request = self.signer.sign(&self.request, &credential, &self.app)?;

		self.transition(OperationState::Done)?;

		Ok(SignedRequest { request, credential })
	}

	/// Runs the strategy; `None` means the caller cancelled and the lease was released.
	async fn lead_refresh(
		&self,
		lease: RefreshLease,
	) -> Option<std::result::Result<Credential, Arc<Error>>> {
		const STAGE: PipelineStage = PipelineStage::Refresh;

		let strategy = lease.strategy().clone();
		let identity = lease.identity().clone();
		let stale = lease.stale().cloned();

		obs::record_stage_outcome(STAGE, StageOutcome::Attempt);

		let result = obs::in_stage(STAGE, "lead_refresh", async {
			tokio::select! {
				biased;
				_ = self.cancellation.cancelled() => None,
				result = async { strategy.refresh(&identity, stale.as_ref()).await } => Some(result),
			}
		})
		.await;
		let Some(result) = result else {
			obs::record_stage_outcome(STAGE, StageOutcome::Cancelled);

			return None;
		};
		let outcome = lease.complete(result);

		match &outcome {
			Ok(_) => obs::record_stage_outcome(STAGE, StageOutcome::Success),
			Err(_cause) => {
				obs::warn_event!(identity = %identity, error = %_cause, "credential refresh failed");
				obs::record_stage_outcome(STAGE, StageOutcome::Failure);
			},
		}

		Some(outcome)
	}

	fn transition(&mut self, next: OperationState) -> Result<()> {
		if self.cancellation.is_cancelled() {
			return Err(self.cancel());
		}

		obs::debug_event!(identity = %self.identity, from = self.state.as_str(), to = next.as_str());

		self.state = next;

		Ok(())
	}

	fn cancel(&mut self) -> Error {
		self.state = OperationState::Cancelled;

		Error::Cancelled
	}
}

/// Maps a shared refresh failure to the caller-facing error.
///
/// Failures that tell the caller what to do next (nothing to refresh, log in again) pass through;
/// everything else is wrapped so the cause stays attached.
fn refresh_error(kind: CredentialKind, cause: Arc<Error>) -> Error {
	match cause.as_ref() {
		Error::NoCredentialAvailable { kind } => Error::NoCredentialAvailable { kind: *kind },
		Error::ReauthenticationRequired { user } =>
			Error::ReauthenticationRequired { user: user.clone() },
		_ => Error::RefreshFailed { kind, source: cause },
	}
}
