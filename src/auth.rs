//! Identity types, credentials, and app key material.

pub mod app;
pub mod credential;
pub mod id;
pub mod secret;

pub use app::*;
pub use credential::*;
pub use id::*;
pub use secret::*;
