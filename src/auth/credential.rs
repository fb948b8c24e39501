//! Immutable guest/user credentials and the routing identity they belong to.

// self
use crate::{
	_prelude::*,
	auth::{TokenSecret, UserId},
};

/// Credential class; one pipeline queue exists per kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
	/// App-level guest bearer token.
	Guest,
	/// OAuth 1.0a token pair tied to a user.
	User,
}
impl CredentialKind {
	/// Returns a stable label suitable for span, metric, or storage fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CredentialKind::Guest => "guest",
			CredentialKind::User => "user",
		}
	}
}
impl Display for CredentialKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Who a request is signed as; also the key of every per-credential store entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
	/// The single guest session.
	Guest,
	/// A logged-in user.
	User(UserId),
}
impl Identity {
	/// Routes `None` to the guest session and `Some(user)` to that user.
	pub fn from_user(user: Option<UserId>) -> Self {
		match user {
			Some(user) => Self::User(user),
			None => Self::Guest,
		}
	}

	/// Credential class of this identity.
	pub fn kind(&self) -> CredentialKind {
		match self {
			Self::Guest => CredentialKind::Guest,
			Self::User(_) => CredentialKind::User,
		}
	}

	/// Returns the user identifier for user identities.
	pub fn user(&self) -> Option<&UserId> {
		match self {
			Self::Guest => None,
			Self::User(user) => Some(user),
		}
	}
}
impl Display for Identity {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Guest => f.write_str("guest"),
			Self::User(user) => write!(f, "user:{user}"),
		}
	}
}

/// Secret material carried by a credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum CredentialMaterial {
	/// App-only bearer token plus the guest token activated with it.
	Guest {
		/// App-only bearer access token.
		access_token: TokenSecret,
		/// Guest token sent in the `x-guest-token` header.
		guest_token: TokenSecret,
	},
	/// OAuth 1.0a access token pair.
	User {
		/// OAuth token.
		token: TokenSecret,
		/// OAuth token secret.
		token_secret: TokenSecret,
	},
}
impl Debug for CredentialMaterial {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Guest { .. } => f.write_str("Guest(<redacted>)"),
			Self::User { .. } => f.write_str("User(<redacted>)"),
		}
	}
}

/// Immutable credential value; a refresh always produces a new value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	identity: Identity,
	material: CredentialMaterial,
	issued_at: OffsetDateTime,
}
impl Credential {
	/// Builds a guest credential issued now.
	pub fn guest(access_token: impl Into<String>, guest_token: impl Into<String>) -> Self {
		Self {
			identity: Identity::Guest,
			material: CredentialMaterial::Guest {
				access_token: TokenSecret::new(access_token),
				guest_token: TokenSecret::new(guest_token),
			},
			issued_at: OffsetDateTime::now_utc(),
		}
	}

	/// Builds a user credential issued now.
	pub fn user(
		user: UserId,
		token: impl Into<String>,
		token_secret: impl Into<String>,
	) -> Self {
		Self {
			identity: Identity::User(user),
			material: CredentialMaterial::User {
				token: TokenSecret::new(token),
				token_secret: TokenSecret::new(token_secret),
			},
			issued_at: OffsetDateTime::now_utc(),
		}
	}

	/// Returns a copy stamped with a different issue instant.
	pub fn with_issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = instant;

		self
	}

	/// Returns a new value carrying the same material, issued now.
	pub fn reissued(&self) -> Self {
		self.clone().with_issued_at(OffsetDateTime::now_utc())
	}

	/// Identity the credential signs for.
	pub fn identity(&self) -> &Identity {
		&self.identity
	}

	/// Credential class.
	pub fn kind(&self) -> CredentialKind {
		self.identity.kind()
	}

	/// Secret material.
	pub fn material(&self) -> &CredentialMaterial {
		&self.material
	}

	/// Instant the credential was obtained.
	pub fn issued_at(&self) -> OffsetDateTime {
		self.issued_at
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("identity", &self.identity)
			.field("material", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn constructors_set_identity_and_kind() {
		let guest = Credential::guest("bearer", "guest-1");
		let user = Credential::user(
			UserId::new("42").expect("User fixture should be valid."),
			"token",
			"secret",
		);

		assert_eq!(guest.identity(), &Identity::Guest);
		assert_eq!(guest.kind(), CredentialKind::Guest);
		assert_eq!(user.kind(), CredentialKind::User);
		assert_eq!(user.identity().to_string(), "user:42");
	}

	#[test]
	fn reissue_keeps_material_and_moves_instant() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let original = Credential::guest("bearer", "guest-1").with_issued_at(issued);
		let renewed = original.reissued();

		assert_eq!(renewed.material(), original.material());
		assert!(renewed.issued_at() > original.issued_at());
		assert_eq!(original.issued_at(), issued);
	}

	#[test]
	fn debug_redacts_material() {
		let user = Credential::user(
			UserId::new("7").expect("User fixture should be valid."),
			"visible-token",
			"visible-secret",
		);
		let rendered = format!("{user:?}");

		assert!(!rendered.contains("visible-token"));
		assert!(!rendered.contains("visible-secret"));
	}

	#[test]
	fn routing_maps_optional_user() {
		assert_eq!(Identity::from_user(None), Identity::Guest);

		let user = UserId::new("42").expect("User fixture should be valid.");

		assert_eq!(Identity::from_user(Some(user.clone())).user(), Some(&user));
	}
}
