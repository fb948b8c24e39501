//! Authenticated request pipeline: guest/user credential stores, single-flight refresh,
//! OAuth 1.0a signing, and single-retry execution over a pluggable transport.
//!
//! Callers hand an unsigned [`http::ApiRequest`] to [`pipeline::Pipeline::enqueue`] together with
//! the [`store::CredentialStore`] to sign from and an optional user identifier. The pipeline
//! resolves (and if needed refreshes) the credential, signs, executes, classifies the response,
//! and retries at most once after an authentication failure.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod error;
pub mod http;
pub mod obs;
pub mod pipeline;
pub mod refresh;
pub mod service;
pub mod signing;
pub mod store;

mod oauth;

mod _prelude {
	pub use std::{
		collections::{HashMap, HashSet},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::Hash,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
