//! Pipeline-level error types shared across signing, refresh, stores, and transports.

// self
use crate::{
	_prelude::*,
	auth::{CredentialKind, UserId},
	http::ApiResponse,
};

/// Pipeline-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical pipeline error delivered to callers.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Token endpoint answered with something the pipeline could not use.
	#[error(transparent)]
	Protocol(#[from] ProtocolError),

	/// No credential exists for the routing and none can be obtained.
	#[error("No {kind} credential is available to sign the request.")]
	NoCredentialAvailable {
		/// Credential class the request was routed to.
		kind: CredentialKind,
	},
	/// Refreshing the credential failed; the cause is shared with every parked request.
	#[error("Refreshing the {kind} credential failed.")]
	RefreshFailed {
		/// Credential class whose refresh failed.
		kind: CredentialKind,
		/// Underlying refresh failure.
		#[source]
		source: Arc<Error>,
	},
	/// The user's long-lived token was rejected; the user must log in again.
	#[error("User {user} must re-authenticate.")]
	ReauthenticationRequired {
		/// User whose token was rejected.
		user: UserId,
	},
	/// Every attempt was rejected as an authentication failure.
	#[error("Authentication failed after {attempts} attempts.")]
	AuthenticationFailed {
		/// Number of attempts performed (retry included).
		attempts: u8,
	},
	/// The API answered with a non-success status unrelated to credentials.
	#[error("API request failed with status {status}.")]
	Api {
		/// HTTP status code.
		status: u16,
		/// API error codes parsed from the error envelope.
		codes: Vec<u32>,
		/// First API error message, if any.
		message: Option<String>,
	},
	/// The request was cancelled through its handle.
	#[error("Request was cancelled.")]
	Cancelled,
	/// The pipeline's worker queues are gone.
	#[error("Pipeline has shut down.")]
	PipelineShutdown,
}
impl Error {
	/// Returns `true` for [`Error::Cancelled`].
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled)
	}

	/// Builds [`Error::Api`] from a non-success response and its error envelope.
	pub fn api(response: &ApiResponse) -> Self {
		let entries = response.api_errors();

		Self::Api {
			status: response.status.as_u16(),
			codes: entries.iter().map(|entry| entry.code).collect(),
			message: entries.into_iter().map(|entry| entry.message).find(|m| !m.is_empty()),
		}
	}
}

/// Configuration and validation failures raised by the pipeline.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A header value could not be encoded.
	#[error(transparent)]
	InvalidHeader(#[from] oauth2::http::header::InvalidHeaderValue),
	/// An endpoint URL cannot be parsed.
	#[error("Endpoint URL is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Service descriptor validation failed.
	#[error(transparent)]
	Service(#[from] crate::service::ServiceDescriptorError),
	/// The signature key was rejected by the signature math.
	#[error("Signing key was rejected.")]
	SigningKey,
	/// A refresh strategy returned a credential for a different identity.
	#[error("Refresh produced a credential for {actual} while refreshing {expected}.")]
	IdentityMismatch {
		/// Identity being refreshed.
		expected: String,
		/// Identity the strategy returned.
		actual: String,
	},
	/// A queue was configured without workers.
	#[error("The {kind} queue concurrency must be at least 1.")]
	InvalidConcurrency {
		/// Queue whose concurrency is invalid.
		kind: CredentialKind,
	},
	/// No tokio runtime was supplied or running.
	#[error("A tokio runtime is required to build the pipeline.")]
	MissingRuntime,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Token endpoint responses the pipeline could not use.
#[derive(Debug, ThisError)]
pub enum ProtocolError {
	/// The endpoint returned an unexpected but well-formed response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// The endpoint responded with JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO, timeouts).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while executing the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The transport gave up waiting for the response.
	#[error("Request timed out.")]
	Timeout,
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while executing the request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout } else { Self::network(e) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn refresh_failure_exposes_shared_cause() {
		let cause = Arc::new(Error::from(TransportError::Timeout));
		let err = Error::RefreshFailed { kind: CredentialKind::Guest, source: cause.clone() };
		let source = StdError::source(&err).expect("Refresh failure should expose its cause.");

		assert_eq!(source.to_string(), cause.to_string());
		assert!(err.to_string().contains("guest"));
	}

	#[test]
	fn api_errors_collect_envelope_codes() {
		let response = ApiResponse::new(
			crate::http::StatusCode::FORBIDDEN,
			r#"{"errors":[{"code":187,"message":"Status is a duplicate."},{"code":44}]}"#,
		);

		match Error::api(&response) {
			Error::Api { status, codes, message } => {
				assert_eq!(status, 403);
				assert_eq!(codes, vec![187, 44]);
				assert_eq!(message.as_deref(), Some("Status is a duplicate."));
			},
			other => panic!("Unexpected error: {other:?}."),
		}
	}

	#[test]
	fn cancelled_is_distinct() {
		assert!(Error::Cancelled.is_cancelled());
		assert!(!Error::AuthenticationFailed { attempts: 2 }.is_cancelled());
	}
}
