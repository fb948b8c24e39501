//! App-only bearer token exchange over the shared [`Transport`].
//!
//! The `client_credentials` grant is driven by [`oauth2::basic::BasicClient`]; the HTTP exchange
//! itself runs through [`TransportHttpClient`], so guest refreshes honor the same transport (and
//! the same test doubles) as signed API calls.

// crates.io
use oauth2::{
	ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError, RequestTokenError,
	TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	auth::{AppCredentials, TokenSecret},
	error::{ConfigError, ProtocolError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, Transport, TransportHttpClient},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Exchanges the app's consumer key pair for an app-only bearer token.
pub(crate) struct AppTokenClient {
	oauth_client: ConfiguredBasicClient,
	transport: Arc<dyn Transport>,
}
impl AppTokenClient {
	pub(crate) fn new(
		app: &AppCredentials,
		token_endpoint: &Url,
		transport: Arc<dyn Transport>,
	) -> Result<Self> {
		let token_url = TokenUrl::new(token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let oauth_client = BasicClient::new(ClientId::new(app.consumer_key().to_owned()))
			.set_client_secret(ClientSecret::new(app.consumer_secret().expose().to_owned()))
			.set_token_uri(token_url);

		Ok(Self { oauth_client, transport })
	}

	/// Runs the `client_credentials` grant and returns the bearer access token.
	pub(crate) fn fetch_app_token(&self) -> FacadeFuture<'_, TokenSecret> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = TransportHttpClient::new(self.transport.clone(), meta.clone());
			let response = self
				.oauth_client
				.exchange_client_credentials()
				.request_async(&instrumented)
				.await
				.map_err(|err| map_request_error(meta.take(), err))?;
			let token = response.access_token().secret();

			if token.is_empty() {
				return Err(ProtocolError::TokenEndpoint {
					message: "empty access token".into(),
					status: meta_status(meta.take().as_ref()),
				}
				.into());
			}

			Ok(TokenSecret::new(token.to_owned()))
		})
	}
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<TransportError>>,
) -> Error {
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(response, meta_ref),
		RequestTokenError::Request(error) => map_transport_error(meta_ref, error),
		RequestTokenError::Parse(source, _body) =>
			ProtocolError::ResponseParse { source, status: meta_status(meta_ref) }.into(),
		RequestTokenError::Other(message) =>
			ProtocolError::TokenEndpoint { message, status: meta_status(meta_ref) }.into(),
	}
}

fn map_server_response_error(
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let message = match response.error_description() {
		Some(description) => format!("{}: {description}", response.error().as_ref()),
		None => response.error().as_ref().to_owned(),
	};

	ProtocolError::TokenEndpoint { message, status: meta_status(meta) }.into()
}

fn map_transport_error(
	meta: Option<&ResponseMetadata>,
	err: HttpClientError<TransportError>,
) -> Error {
	match err {
		HttpClientError::Reqwest(inner) => Error::Transport(*inner),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Other(message) =>
			ProtocolError::TokenEndpoint { message, status: meta_status(meta) }.into(),
		_ => ProtocolError::TokenEndpoint {
			message: "HTTP client error occurred while calling the token endpoint".into(),
			status: meta_status(meta),
		}
		.into(),
	}
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}
