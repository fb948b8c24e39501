//! Request/response descriptors and the transport seam.
//!
//! The pipeline never talks to an HTTP stack directly. Callers provide a [`Transport`]
//! (typically [`ReqwestTransport`] behind the default `reqwest` feature) and the pipeline
//! hands it fully signed [`ApiRequest`] values. Refresh strategies reuse the same transport;
//! the guest token exchange drives it through an internal [`oauth2::AsyncHttpClient`] adapter
//! that records response metadata in a [`ResponseMetadataSlot`] so OAuth errors can be
//! reported with their HTTP status.

pub use oauth2::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};

// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::CorrelationId,
	error::{ConfigError, ProtocolError, TransportError},
};

/// Header carrying the guest token next to the app bearer token.
pub const GUEST_TOKEN_HEADER: &str = "x-guest-token";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Boxed future returned by [`Transport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// HTTP transport collaborator executing signed requests.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by the
/// pipeline, its workers, and the refresh strategies. Dropping the returned future must abort
/// the exchange; [`cancel`](Transport::cancel) is an additional best-effort hook for transports
/// that track in-flight calls by correlation id.
pub trait Transport
where
	Self: 'static + Send + Sync,
{
	/// Executes `request` and returns the raw response.
	fn execute(&self, request: ApiRequest, correlation: CorrelationId) -> TransportFuture<'_>;

	/// Best-effort cancellation of an in-flight call.
	fn cancel(&self, _correlation: CorrelationId) {}
}

/// Unsigned (or signed) HTTP request descriptor.
#[derive(Clone)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL including the query string.
	pub url: Url,
	/// Request headers.
	pub headers: HeaderMap,
	/// Raw request body.
	pub body: Vec<u8>,
}
impl ApiRequest {
	/// Creates a request without headers or body.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: Vec::new() }
	}

	/// Shorthand for a `GET` request.
	pub fn get(url: Url) -> Self {
		Self::new(Method::GET, url)
	}

	/// Shorthand for a `POST` request.
	pub fn post(url: Url) -> Self {
		Self::new(Method::POST, url)
	}

	/// Sets (or replaces) a header.
	pub fn with_header(mut self, name: HeaderName, value: &str) -> Result<Self, ConfigError> {
		self.headers.insert(name, HeaderValue::from_str(value)?);

		Ok(self)
	}

	/// Encodes `pairs` as an `application/x-www-form-urlencoded` body.
	pub fn with_form<I, K, V>(mut self, pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: AsRef<str>,
	{
		let body = url::form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish();

		self.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
		self.body = body.into_bytes();

		self
	}

	/// Sets a raw body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = body.into();

		self
	}

	/// Returns `true` when the body is form encoded (and therefore part of OAuth signatures).
	pub fn has_form_body(&self) -> bool {
		self.headers
			.get(header::CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.map(|value| value.trim_start().starts_with(FORM_CONTENT_TYPE))
			.unwrap_or(false)
	}

	/// Decoded form body parameters (empty when the body is not form encoded).
	pub fn form_params(&self) -> Vec<(String, String)> {
		if !self.has_form_body() {
			return Vec::new();
		}

		url::form_urlencoded::parse(&self.body).into_owned().collect()
	}

	pub(crate) fn into_http(self) -> Result<HttpRequest, ConfigError> {
		let mut request = oauth2::http::Request::builder()
			.method(self.method)
			.uri(self.url.as_str())
			.body(self.body)?;

		*request.headers_mut() = self.headers;

		Ok(request)
	}

	pub(crate) fn from_http(request: HttpRequest) -> Result<Self, ConfigError> {
		let (parts, body) = request.into_parts();
		let url = Url::parse(&parts.uri.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;

		Ok(Self { method: parts.method, url, headers: parts.headers, body })
	}
}
impl Debug for ApiRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let headers = self
			.headers
			.iter()
			.map(|(name, value)| {
				let shown = if is_sensitive_header(name) {
					"<redacted>"
				} else {
					value.to_str().unwrap_or("<binary>")
				};

				(name.as_str(), shown)
			})
			.collect::<Vec<_>>();

		f.debug_struct("ApiRequest")
			.field("method", &self.method)
			.field("url", &self.url.as_str())
			.field("headers", &headers)
			.field("body_len", &self.body.len())
			.finish()
	}
}

/// Raw HTTP response returned by a [`Transport`].
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Creates a response without headers.
	pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: HeaderMap::new(), body: body.into() }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Deserializes the body, reporting the failing JSON path on error.
	pub fn json<T>(&self) -> Result<T, ProtocolError>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer).map_err(|source| {
			ProtocolError::ResponseParse { source, status: Some(self.status.as_u16()) }
		})
	}

	/// Entries of the API's `{"errors": [...]}` envelope; empty when absent or malformed.
	pub fn api_errors(&self) -> Vec<ApiErrorEntry> {
		serde_json::from_slice::<ApiErrorEnvelope>(&self.body)
			.map(|envelope| envelope.errors)
			.unwrap_or_default()
	}

	/// Returns `true` when the error envelope carries `code`.
	pub fn has_error_code(&self, code: u32) -> bool {
		self.api_errors().iter().any(|entry| entry.code == code)
	}

	fn into_http(self) -> HttpResponse {
		let mut response = HttpResponse::new(self.body);

		*response.status_mut() = self.status;
		*response.headers_mut() = self.headers;

		response
	}
}

/// One entry of the API error envelope.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ApiErrorEntry {
	/// Numeric API error code.
	pub code: u32,
	/// Human-readable message.
	#[serde(default)]
	pub message: String,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
	#[serde(default)]
	errors: Vec<ApiErrorEntry>,
}

/// Metadata captured from the most recent response seen by the OAuth adapter.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response arrived.
	pub status: Option<u16>,
}

/// Thread-safe slot sharing [`ResponseMetadata`] between the adapter and error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Drives `oauth2` token requests over any [`Transport`].
pub(crate) struct TransportHttpClient {
	transport: Arc<dyn Transport>,
	slot: ResponseMetadataSlot,
}
impl TransportHttpClient {
	pub(crate) fn new(transport: Arc<dyn Transport>, slot: ResponseMetadataSlot) -> Self {
		Self { transport, slot }
	}
}
impl<'c> AsyncHttpClient<'c> for TransportHttpClient {
	type Error = HttpClientError<TransportError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.slot.take();

			let request = ApiRequest::from_http(request)
				.map_err(|e| HttpClientError::Other(e.to_string()))?;
			let response =
				self.transport.execute(request, CorrelationId::next()).await.map_err(Box::new)?;

			self.slot.store(ResponseMetadata { status: Some(response.status.as_u16()) });

			Ok(response.into_http())
		})
	}
}

/// [`Transport`] backed by a shared [`ReqwestClient`].
///
/// Timeouts configured on the client surface as [`TransportError::Timeout`]; dropping the
/// future aborts the underlying connection, which is how pipeline cancellation reaches reqwest.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
	fn execute(&self, request: ApiRequest, _correlation: CorrelationId) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let request: reqwest::Request =
				request.into_http().map_err(TransportError::network)?.try_into()?;
			let response = client.execute(request).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await?.to_vec();

			Ok(ApiResponse { status, headers, body })
		})
	}
}

fn is_sensitive_header(name: &HeaderName) -> bool {
	name == header::AUTHORIZATION || name.as_str() == GUEST_TOKEN_HEADER
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Failed to parse request URL fixture.")
	}

	#[test]
	fn form_bodies_round_trip_through_params() {
		let request = ApiRequest::post(url("https://api.example.com/1.1/statuses/update.json"))
			.with_form([("status", "Hello Ladies + Gentlemen")]);

		assert!(request.has_form_body());
		assert_eq!(
			request.form_params(),
			vec![("status".to_owned(), "Hello Ladies + Gentlemen".to_owned())]
		);
		assert!(ApiRequest::get(url("https://api.example.com/")).form_params().is_empty());
	}

	#[test]
	fn debug_redacts_auth_headers() {
		let request = ApiRequest::get(url("https://api.example.com/"))
			.with_header(header::AUTHORIZATION, "Bearer hunter2")
			.and_then(|r| r.with_header(HeaderName::from_static(GUEST_TOKEN_HEADER), "g-1"))
			.expect("Header fixtures should be valid.");
		let rendered = format!("{request:?}");

		assert!(!rendered.contains("hunter2"));
		assert!(!rendered.contains("g-1"));
	}

	#[test]
	fn api_error_envelope_parses_codes() {
		let response = ApiResponse::new(
			StatusCode::UNAUTHORIZED,
			r#"{"errors":[{"code":89,"message":"Invalid or expired token."}]}"#,
		);

		assert!(response.has_error_code(89));
		assert_eq!(response.api_errors()[0].message, "Invalid or expired token.");
		assert!(ApiResponse::new(StatusCode::BAD_GATEWAY, "<html>").api_errors().is_empty());
	}

	#[test]
	fn http_conversion_preserves_parts() {
		let request = ApiRequest::post(url("https://api.example.com/oauth2/token?x=1"))
			.with_form([("grant_type", "client_credentials")]);
		let http = request.clone().into_http().expect("Request should convert to http.");
		let back = ApiRequest::from_http(http).expect("Request should convert back.");

		assert_eq!(back.url, request.url);
		assert_eq!(back.method, Method::POST);
		assert_eq!(back.body, request.body);
		assert!(back.has_form_body());
	}
}
