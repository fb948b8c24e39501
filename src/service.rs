//! Service endpoints and pipeline tuning.
//!
//! [`ServiceDescriptor`] holds the validated, HTTPS-only endpoints the refresh strategies call;
//! [`PipelineConfig`] holds worker-pool sizing. Both are plain serde data so they can be loaded
//! from whatever configuration source the host application uses.

// self
use crate::{_prelude::*, auth::CredentialKind, error::ConfigError};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ServiceDescriptorError {
	/// A required endpoint was not configured.
	#[error("Missing {endpoint} endpoint.")]
	MissingEndpoint {
		/// Which endpoint is missing.
		endpoint: &'static str,
	},
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// An endpoint path could not be joined onto the API base.
	#[error("The {endpoint} endpoint cannot be derived from the API base URL.")]
	InvalidPath {
		/// Which endpoint failed.
		endpoint: &'static str,
	},
}

/// Endpoint set used by refresh strategies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoints {
	/// OAuth 2.0 token endpoint issuing app-only bearer tokens.
	pub app_token: Url,
	/// Endpoint activating a guest token for an app bearer token.
	pub guest_activate: Url,
	/// Endpoint validating a user's OAuth 1.0a token pair.
	pub verify_credentials: Url,
}

/// Immutable descriptor of the remote API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
	/// Endpoint definitions.
	pub endpoints: ServiceEndpoints,
}
impl ServiceDescriptor {
	const APP_TOKEN_PATH: &'static str = "oauth2/token";
	const GUEST_ACTIVATE_PATH: &'static str = "1.1/guest/activate.json";
	const VERIFY_CREDENTIALS_PATH: &'static str = "1.1/account/verify_credentials.json";
	const TWITTER_API_BASE: &'static str = "https://api.twitter.com/";

	/// Creates a new builder.
	pub fn builder() -> ServiceDescriptorBuilder {
		ServiceDescriptorBuilder::default()
	}

	/// Descriptor for the public Twitter REST API.
	pub fn twitter() -> Result<Self, ConfigError> {
		let base = Url::parse(Self::TWITTER_API_BASE)
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;

		Ok(Self::builder().api_base(&base)?.build()?)
	}

	fn validate(&self) -> Result<(), ServiceDescriptorError> {
		validate_endpoint("app_token", &self.endpoints.app_token)?;
		validate_endpoint("guest_activate", &self.endpoints.guest_activate)?;
		validate_endpoint("verify_credentials", &self.endpoints.verify_credentials)?;

		Ok(())
	}
}

/// Builder for [`ServiceDescriptor`] values.
#[derive(Debug, Default)]
pub struct ServiceDescriptorBuilder {
	/// OAuth 2.0 token endpoint.
	pub app_token: Option<Url>,
	/// Guest activation endpoint.
	pub guest_activate: Option<Url>,
	/// Credential verification endpoint.
	pub verify_credentials: Option<Url>,
}
impl ServiceDescriptorBuilder {
	/// Derives every endpoint from the API base URL using the standard paths.
	pub fn api_base(mut self, base: &Url) -> Result<Self, ServiceDescriptorError> {
		let join = |endpoint: &'static str, path: &str| {
			base.join(path).map_err(|_| ServiceDescriptorError::InvalidPath { endpoint })
		};

		self.app_token = Some(join("app_token", ServiceDescriptor::APP_TOKEN_PATH)?);
		self.guest_activate = Some(join("guest_activate", ServiceDescriptor::GUEST_ACTIVATE_PATH)?);
		self.verify_credentials =
			Some(join("verify_credentials", ServiceDescriptor::VERIFY_CREDENTIALS_PATH)?);

		Ok(self)
	}

	/// Sets the OAuth 2.0 token endpoint.
	pub fn app_token_endpoint(mut self, url: Url) -> Self {
		self.app_token = Some(url);

		self
	}

	/// Sets the guest activation endpoint.
	pub fn guest_activate_endpoint(mut self, url: Url) -> Self {
		self.guest_activate = Some(url);

		self
	}

	/// Sets the credential verification endpoint.
	pub fn verify_credentials_endpoint(mut self, url: Url) -> Self {
		self.verify_credentials = Some(url);

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ServiceDescriptor, ServiceDescriptorError> {
		let endpoints = ServiceEndpoints {
			app_token: self
				.app_token
				.ok_or(ServiceDescriptorError::MissingEndpoint { endpoint: "app_token" })?,
			guest_activate: self
				.guest_activate
				.ok_or(ServiceDescriptorError::MissingEndpoint { endpoint: "guest_activate" })?,
			verify_credentials: self.verify_credentials.ok_or(
				ServiceDescriptorError::MissingEndpoint { endpoint: "verify_credentials" },
			)?,
		};
		let descriptor = ServiceDescriptor { endpoints };

		descriptor.validate()?;

		Ok(descriptor)
	}
}

/// Worker-pool sizing for the guest and user queues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
	/// Signing operations the guest queue runs at once.
	pub guest_concurrency: usize,
	/// Signing operations the user queue runs at once (shared by all users).
	pub user_concurrency: usize,
}
impl PipelineConfig {
	/// Worker count for the queue serving `kind`.
	pub fn concurrency(&self, kind: CredentialKind) -> usize {
		match kind {
			CredentialKind::Guest => self.guest_concurrency,
			CredentialKind::User => self.user_concurrency,
		}
	}

	/// Rejects queues without workers.
	pub fn validate(&self) -> Result<(), ConfigError> {
		for kind in [CredentialKind::Guest, CredentialKind::User] {
			if self.concurrency(kind) == 0 {
				return Err(ConfigError::InvalidConcurrency { kind });
			}
		}

		Ok(())
	}
}
impl Default for PipelineConfig {
	fn default() -> Self {
		Self { guest_concurrency: 4, user_concurrency: 4 }
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ServiceDescriptorError> {
	if url.scheme() != "https" {
		Err(ServiceDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	} else {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Failed to parse endpoint URL fixture.")
	}

	#[test]
	fn twitter_defaults_use_standard_paths() {
		let descriptor = ServiceDescriptor::twitter().expect("Default descriptor should build.");

		assert_eq!(descriptor.endpoints.app_token.as_str(), "https://api.twitter.com/oauth2/token");
		assert_eq!(
			descriptor.endpoints.guest_activate.as_str(),
			"https://api.twitter.com/1.1/guest/activate.json"
		);
	}

	#[test]
	fn builder_rejects_insecure_and_missing_endpoints() {
		let err = ServiceDescriptor::builder()
			.app_token_endpoint(url("https://api.example.com/oauth2/token"))
			.build()
			.expect_err("Missing endpoints should be rejected.");

		assert_eq!(err, ServiceDescriptorError::MissingEndpoint { endpoint: "guest_activate" });

		let err = ServiceDescriptor::builder()
			.api_base(&url("http://api.example.com/"))
			.expect("Plain paths should join onto any base.")
			.build()
			.expect_err("Insecure endpoints should be rejected.");

		assert!(matches!(
			err,
			ServiceDescriptorError::InsecureEndpoint { endpoint: "app_token", .. }
		));
	}

	#[test]
	fn config_requires_workers() {
		assert!(PipelineConfig::default().validate().is_ok());

		let config = PipelineConfig { user_concurrency: 0, ..PipelineConfig::default() };

		assert!(matches!(
			config.validate(),
			Err(ConfigError::InvalidConcurrency { kind: CredentialKind::User })
		));

		let parsed: PipelineConfig = serde_json::from_str(r#"{"guest_concurrency":1}"#)
			.expect("Partial config should fill defaults.");

		assert_eq!(parsed, PipelineConfig { guest_concurrency: 1, user_concurrency: 4 });
	}
}
