//! OAuth 1.0a request signatures (RFC 5849) for user credentials.

// std
use std::fmt::Write as _;
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use rand::{Rng, distr::Alphanumeric};
use sha1::Sha1;
// self
use crate::{_prelude::*, auth::AppCredentials, error::ConfigError, http::ApiRequest};

const NONCE_LEN: usize = 32;
const OAUTH_VERSION: &str = "1.0";

/// Keyed digest used to produce the `oauth_signature` value.
pub trait SignatureMath
where
	Self: 'static + Send + Sync,
{
	/// Value of the `oauth_signature_method` parameter.
	fn method_name(&self) -> &'static str;

	/// Signs `base` with `key` and returns the base64-encoded digest.
	fn sign(&self, key: &[u8], base: &[u8]) -> Result<String, ConfigError>;
}

/// HMAC-SHA1 signature math.
#[derive(Clone, Copy, Debug, Default)]
pub struct HmacSha1;
impl SignatureMath for HmacSha1 {
	fn method_name(&self) -> &'static str {
		"HMAC-SHA1"
	}

	fn sign(&self, key: &[u8], base: &[u8]) -> Result<String, ConfigError> {
		let mut mac = <Hmac<Sha1>>::new_from_slice(key).map_err(|_| ConfigError::SigningKey)?;

		mac.update(base);

		Ok(STANDARD.encode(mac.finalize().into_bytes()))
	}
}

/// Per-request protocol values; fresh for every signature outside tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthNonce {
	/// `oauth_nonce` value.
	pub nonce: String,
	/// `oauth_timestamp` value (seconds since the Unix epoch).
	pub timestamp: i64,
}
impl OAuthNonce {
	/// Generates a random alphanumeric nonce stamped with the current time.
	pub fn generate() -> Self {
		Self::generate_at(OffsetDateTime::now_utc())
	}

	/// Generates a random alphanumeric nonce stamped with `now`.
	pub fn generate_at(now: OffsetDateTime) -> Self {
		let nonce = rand::rng().sample_iter(Alphanumeric).take(NONCE_LEN).map(char::from).collect();

		Self { nonce, timestamp: now.unix_timestamp() }
	}
}

/// Token pair the request is signed with.
#[derive(Clone, Copy, Debug)]
pub struct OAuthToken<'a> {
	/// `oauth_token` value.
	pub token: &'a str,
	/// Token secret, second half of the signing key.
	pub secret: &'a str,
}

/// Builds the `Authorization: OAuth ...` header value for `request`.
pub fn authorization_header(
	math: &dyn SignatureMath,
	request: &ApiRequest,
	app: &AppCredentials,
	token: OAuthToken<'_>,
	nonce: &OAuthNonce,
) -> Result<String, ConfigError> {
	let timestamp = nonce.timestamp.to_string();
	let protocol = [
		("oauth_consumer_key", app.consumer_key()),
		("oauth_nonce", nonce.nonce.as_str()),
		("oauth_signature_method", math.method_name()),
		("oauth_timestamp", timestamp.as_str()),
		("oauth_token", token.token),
		("oauth_version", OAUTH_VERSION),
	];
	let base = signature_base(request, &protocol);
	let key = format!(
		"{}&{}",
		percent_encode(app.consumer_secret().expose()),
		percent_encode(token.secret)
	);
	let signature = math.sign(key.as_bytes(), base.as_bytes())?;
	let mut header_params =
		protocol.iter().map(|(k, v)| (*k, percent_encode(v))).collect::<Vec<_>>();

	header_params.push(("oauth_signature", percent_encode(&signature)));
	header_params.sort();

	let mut header = String::from("OAuth ");

	for (i, (key, value)) in header_params.iter().enumerate() {
		if i > 0 {
			header.push_str(", ");
		}

		let _ = write!(header, "{key}=\"{value}\"");
	}

	Ok(header)
}

/// Signature base string: method, normalized URL, and sorted encoded parameters.
pub fn signature_base(request: &ApiRequest, protocol: &[(&str, &str)]) -> String {
	let mut params = request
		.url
		.query_pairs()
		.map(|(k, v)| (percent_encode(&k), percent_encode(&v)))
		.chain(request.form_params().iter().map(|(k, v)| (percent_encode(k), percent_encode(v))))
		.chain(protocol.iter().map(|(k, v)| (percent_encode(k), percent_encode(v))))
		.collect::<Vec<_>>();

	params.sort();

	let normalized = params.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");

	format!(
		"{}&{}&{}",
		request.method.as_str().to_ascii_uppercase(),
		percent_encode(&base_url(&request.url)),
		percent_encode(&normalized)
	)
}

/// RFC 3986 percent-encoding: everything but `ALPHA / DIGIT / - . _ ~`.
pub fn percent_encode(value: &str) -> String {
	let mut encoded = String::with_capacity(value.len());

	for byte in value.bytes() {
		match byte {
			b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' =>
				encoded.push(char::from(byte)),
			_ => {
				let _ = write!(encoded, "%{byte:02X}");
			},
		}
	}

	encoded
}

fn base_url(url: &Url) -> String {
	let host = url.host_str().unwrap_or_default().to_ascii_lowercase();

	match url.port() {
		Some(port) => format!("{}://{host}:{port}{}", url.scheme(), url.path()),
		None => format!("{}://{host}{}", url.scheme(), url.path()),
	}
}
