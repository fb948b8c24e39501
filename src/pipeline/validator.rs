//! Response classification.

// self
use crate::{
	_prelude::*,
	error::TransportError,
	http::ApiResponse,
	refresh::{Exchange, RefreshStrategy},
};

/// Verdict on one transport exchange.
#[derive(Debug)]
pub enum Validation {
	/// Deliver the response to the caller.
	Success(ApiResponse),
	/// The credential was rejected; refresh and retry if the attempt budget allows.
	RetryableAuthFailure,
	/// Deliver the error to the caller without retrying.
	Terminal(Error),
}

/// Classifies a transport exchange for the pipeline.
pub trait ResponseValidator
where
	Self: 'static + Send + Sync,
{
	/// Classifies `exchange`; `strategy` is the refresh strategy of the request's routing.
	fn classify(
		&self,
		exchange: Result<ApiResponse, TransportError>,
		strategy: &dyn RefreshStrategy,
	) -> Validation;
}

/// 2xx is success, anything the strategy calls stale is retryable, everything else is terminal.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultResponseValidator;
impl ResponseValidator for DefaultResponseValidator {
	fn classify(
		&self,
		exchange: Result<ApiResponse, TransportError>,
		strategy: &dyn RefreshStrategy,
	) -> Validation {
		match exchange {
			Ok(response) if response.is_success() => Validation::Success(response),
			Ok(response) if strategy.is_stale(Exchange::Response(&response)) =>
				Validation::RetryableAuthFailure,
			Ok(response) => Validation::Terminal(Error::api(&response)),
			Err(error) if strategy.is_stale(Exchange::Failed(&error)) =>
				Validation::RetryableAuthFailure,
			Err(error) => Validation::Terminal(error.into()),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::{Credential, CredentialKind, Identity},
		http::StatusCode,
		refresh::RefreshFuture,
	};

	struct UnauthorizedIsStale;
	impl RefreshStrategy for UnauthorizedIsStale {
		fn kind(&self) -> CredentialKind {
			CredentialKind::User
		}

		fn is_stale(&self, exchange: Exchange<'_>) -> bool {
			matches!(exchange, Exchange::Response(r) if r.status == StatusCode::UNAUTHORIZED)
		}

		fn refresh<'a>(&'a self, _: &'a Identity, _: Option<&'a Credential>) -> RefreshFuture<'a> {
			Box::pin(async { Err(Error::NoCredentialAvailable { kind: CredentialKind::User }) })
		}
	}

	fn classify(exchange: Result<ApiResponse, TransportError>) -> Validation {
		DefaultResponseValidator.classify(exchange, &UnauthorizedIsStale)
	}

	#[test]
	fn classifies_success_auth_failure_and_terminal_errors() {
		assert!(matches!(
			classify(Ok(ApiResponse::new(StatusCode::OK, "{}"))),
			Validation::Success(_)
		));
		assert!(matches!(
			classify(Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, ""))),
			Validation::RetryableAuthFailure
		));
		assert!(matches!(
			classify(Ok(ApiResponse::new(
				StatusCode::NOT_FOUND,
				r#"{"errors":[{"code":34,"message":"Sorry, that page does not exist."}]}"#
			))),
			Validation::Terminal(Error::Api { status: 404, .. })
		));
		assert!(matches!(
			classify(Err(TransportError::Timeout)),
			Validation::Terminal(Error::Transport(TransportError::Timeout))
		));
	}
}
