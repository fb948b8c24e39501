//! Credential store: the single source of truth for guest and user credentials.
//!
//! Every piece of mutable state (the guest credential, the user map, the stale set, and the
//! per-identity refresh markers) lives in one [`StoreState`] behind one lock, so a reader never
//! observes a half-applied update. Persistence is mirrored synchronously under that lock; the
//! lock is never held across a network call.

pub mod auth_config;
pub mod file;
pub mod memory;

pub use auth_config::AuthConfigOutcome;
pub use file::FilePersistence;
pub use memory::MemoryPersistence;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use tokio::sync::watch;
// self
use crate::{
	_prelude::*,
	auth::{AppCredentials, Credential, CredentialKind, Identity, UserId},
	error::ConfigError,
	obs,
	refresh::{RefreshMetrics, RefreshStrategies, RefreshStrategy},
};

/// Shared outcome of one refresh, observed by the leader and every parked follower.
pub(crate) type RefreshOutcome = std::result::Result<Credential, Arc<Error>>;

/// Callback invoked with every user credential saved through the store.
pub type SaveHook = Arc<dyn Fn(&Credential) + Send + Sync>;
/// Callback invoked with the user whose credential was deleted.
pub type LogoutHook = Arc<dyn Fn(&UserId) + Send + Sync>;

/// Durable blob storage backing a [`CredentialStore`].
///
/// Calls are synchronous and made while the store lock is held, so implementations should be
/// quick (local disk, keychain, in-memory map).
pub trait CredentialPersistence
where
	Self: 'static + Send + Sync,
{
	/// Inserts or replaces a blob.
	fn put(&self, key: &BlobKey, blob: &[u8]) -> Result<(), StoreError>;

	/// Fetches a blob.
	fn get(&self, key: &BlobKey) -> Result<Option<Vec<u8>>, StoreError>;

	/// Removes a blob; returns `true` when it existed.
	fn delete(&self, key: &BlobKey) -> Result<bool, StoreError>;

	/// Lists every key of `kind`.
	fn keys(&self, kind: BlobKind) -> Result<Vec<BlobKey>, StoreError>;
}

/// Namespace of a persisted blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobKind {
	/// The guest credential.
	Guest,
	/// A user credential.
	User,
	/// App-level configuration fingerprints.
	AuthConfig,
}

/// Key of a persisted blob.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobKey {
	/// Blob namespace.
	pub kind: BlobKind,
	/// Identifier within the namespace.
	pub identity: String,
}
impl BlobKey {
	const GUEST_SENTINEL: &'static str = "guest";

	/// Key of the guest credential.
	pub fn guest() -> Self {
		Self { kind: BlobKind::Guest, identity: Self::GUEST_SENTINEL.into() }
	}

	/// Key of `user`'s credential.
	pub fn user(user: &UserId) -> Self {
		Self { kind: BlobKind::User, identity: user.to_string() }
	}

	/// Key of the credential for `identity`.
	pub fn for_identity(identity: &Identity) -> Self {
		match identity {
			Identity::Guest => Self::guest(),
			Identity::User(user) => Self::user(user),
		}
	}
}

/// Error type produced by [`CredentialPersistence`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Result of [`CredentialStore::mark_stale_if_current`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StaleOutcome {
	/// The credential was still current and is now stale.
	Marked,
	/// A newer credential already replaced it; nothing changed.
	Superseded,
	/// No credential is stored for the identity.
	Missing,
}

/// All mutable store state; only ever touched under [`CredentialStore`]'s lock.
#[derive(Debug, Default)]
struct StoreState {
	guest: Option<Credential>,
	users: HashMap<UserId, Credential>,
	stale: HashSet<Identity>,
	refreshing: HashMap<Identity, RefreshMarker>,
}
impl StoreState {
	fn get(&self, identity: &Identity) -> Option<&Credential> {
		match identity {
			Identity::Guest => self.guest.as_ref(),
			Identity::User(user) => self.users.get(user),
		}
	}

	fn insert(&mut self, credential: Credential) {
		match credential.identity().clone() {
			Identity::Guest => self.guest = Some(credential),
			Identity::User(user) => {
				self.users.insert(user, credential);
			},
		}
	}

	fn remove(&mut self, identity: &Identity) -> Option<Credential> {
		self.stale.remove(identity);
		self.refreshing.remove(identity);

		match identity {
			Identity::Guest => self.guest.take(),
			Identity::User(user) => self.users.remove(user),
		}
	}
}

#[derive(Debug)]
struct RefreshMarker {
	id: u64,
	receiver: watch::Receiver<Option<RefreshOutcome>>,
}

/// What a signing operation must do to obtain a credential.
pub(crate) enum Resolution {
	/// A usable credential is stored.
	Ready(Credential),
	/// Another operation is refreshing this identity; wait for its outcome.
	Wait(RefreshWaiter),
	/// This operation must refresh; the lease holds the marker until completed or dropped.
	Refresh(RefreshLease),
	/// Nothing is stored and the identity cannot be refreshed from scratch.
	Missing,
}

/// Follower side of an in-flight refresh.
pub(crate) struct RefreshWaiter(watch::Receiver<Option<RefreshOutcome>>);
impl RefreshWaiter {
	/// Waits for the leader's outcome; `None` when the leader gave up without finishing.
	pub(crate) async fn outcome(mut self) -> Option<RefreshOutcome> {
		self.0.wait_for(Option::is_some).await.ok().and_then(|value| value.clone())
	}
}

/// Leader side of an in-flight refresh. Dropping an uncompleted lease releases the marker so
/// parked followers can retry.
pub(crate) struct RefreshLease {
	store: Arc<CredentialStore>,
	identity: Identity,
	stale: Option<Credential>,
	id: u64,
	sender: watch::Sender<Option<RefreshOutcome>>,
	completed: bool,
}
impl RefreshLease {
	pub(crate) fn identity(&self) -> &Identity {
		&self.identity
	}

	pub(crate) fn stale(&self) -> Option<&Credential> {
		self.stale.as_ref()
	}

	pub(crate) fn strategy(&self) -> &Arc<dyn RefreshStrategy> {
		self.store.strategy_for(self.identity.kind())
	}

	/// Installs the refreshed credential (or records the failure), wakes followers, and returns
	/// the shared outcome.
	pub(crate) fn complete(mut self, result: Result<Credential>) -> RefreshOutcome {
		let outcome = self
			.store
			.finish_refresh(&self.identity, self.id, self.stale.as_ref(), result)
			.map_err(Arc::new);

		self.store.refresh_metrics.record_outcome(outcome.is_ok());
		self.completed = true;
		self.sender.send_replace(Some(outcome.clone()));

		outcome
	}
}
impl Drop for RefreshLease {
	fn drop(&mut self) {
		if !self.completed {
			self.store.abandon_refresh(&self.identity, self.id);
		}
	}
}

/// Thread-safe guest/user credential store with single-flight refresh markers.
pub struct CredentialStore {
	state: Mutex<StoreState>,
	persistence: Arc<dyn CredentialPersistence>,
	strategies: RefreshStrategies,
	refresh_metrics: Arc<RefreshMetrics>,
	next_lease: AtomicU64,
	save_hook: Option<SaveHook>,
	logout_hook: Option<LogoutHook>,
}
impl CredentialStore {
	/// Creates an empty store; call [`load`](Self::load) to populate it from persistence.
	pub fn new(persistence: Arc<dyn CredentialPersistence>, strategies: RefreshStrategies) -> Self {
		Self {
			state: Mutex::new(StoreState::default()),
			persistence,
			strategies,
			refresh_metrics: Default::default(),
			next_lease: AtomicU64::new(1),
			save_hook: None,
			logout_hook: None,
		}
	}

	/// Calls `hook` after every user credential saved through [`save`](Self::save) or
	/// [`save_verified`](Self::save_verified).
	pub fn with_save_hook(mut self, hook: impl Fn(&Credential) + 'static + Send + Sync) -> Self {
		self.save_hook = Some(Arc::new(hook));

		self
	}

	/// Calls `hook` after a user was logged out through [`delete`](Self::delete).
	pub fn with_logout_hook(mut self, hook: impl Fn(&UserId) + 'static + Send + Sync) -> Self {
		self.logout_hook = Some(Arc::new(hook));

		self
	}

	/// Creates a store, validates the app's auth config fingerprint, then loads credentials.
	pub fn open(
		persistence: Arc<dyn CredentialPersistence>,
		strategies: RefreshStrategies,
		app: &AppCredentials,
	) -> Result<Self> {
		let store = Self::new(persistence, strategies);

		store.validate_auth_config(app)?;
		store.load()?;

		Ok(store)
	}

	/// Replaces in-memory credentials with the persisted ones; returns how many were loaded.
	///
	/// Blobs that fail to decode, or whose identity disagrees with their key, are skipped.
	pub fn load(&self) -> Result<usize> {
		let mut loaded = Vec::new();

		if let Some(credential) = self.read_blob(&BlobKey::guest())? {
			loaded.push(credential);
		}
		for key in self.persistence.keys(BlobKind::User)? {
			if let Some(credential) = self.read_blob(&key)? {
				loaded.push(credential);
			}
		}

		let count = loaded.len();
		let mut state = self.state.lock();

		state.guest = None;
		state.users.clear();
		state.stale.clear();

		for credential in loaded {
			state.insert(credential);
		}

		Ok(count)
	}

	/// Compares the app fingerprint with the persisted one, purging credentials on mismatch.
	pub fn validate_auth_config(&self, app: &AppCredentials) -> Result<AuthConfigOutcome> {
		let mut state = self.state.lock();
		let outcome = auth_config::reconcile(self.persistence.as_ref(), app)?;

		if matches!(outcome, AuthConfigOutcome::Purged { .. }) {
			obs::warn_event!("app credentials changed; persisted sessions purged");

			state.guest = None;
			state.users.clear();
			state.stale.clear();
		}

		Ok(outcome)
	}

	/// Current guest credential, if any.
	pub fn current_guest_credential(&self) -> Option<Credential> {
		self.state.lock().guest.clone()
	}

	/// Credential stored for `user`, if any.
	pub fn credential_for(&self, user: &UserId) -> Option<Credential> {
		self.state.lock().users.get(user).cloned()
	}

	/// Credential stored for `identity`, if any.
	pub fn credential(&self, identity: &Identity) -> Option<Credential> {
		self.state.lock().get(identity).cloned()
	}

	/// Persists and installs `credential`, replacing any previous value and clearing its stale
	/// flag.
	pub fn save(&self, credential: Credential) -> Result<()> {
		{
			let mut state = self.state.lock();

			self.write_blob(&credential)?;
			state.stale.remove(credential.identity());
			state.insert(credential.clone());
		}

		if let (Some(hook), CredentialKind::User) = (&self.save_hook, credential.kind()) {
			hook(&credential);
		}

		Ok(())
	}

	/// Verifies a freshly obtained user credential with the user refresh strategy, then saves
	/// the verified credential. Guest credentials are saved as given.
	pub async fn save_verified(&self, credential: Credential) -> Result<Credential> {
		let verified = match credential.kind() {
			CredentialKind::Guest => credential,
			CredentialKind::User => {
				let identity = credential.identity();
				let verified = self
					.strategy_for(CredentialKind::User)
					.refresh(identity, Some(&credential))
					.await?;

				if verified.identity() != identity {
					return Err(ConfigError::IdentityMismatch {
						expected: identity.to_string(),
						actual: verified.identity().to_string(),
					}
					.into());
				}

				verified
			},
		};

		self.save(verified.clone())?;

		Ok(verified)
	}

	/// Flags the credential for `identity` as stale; the next resolution refreshes it.
	pub fn mark_stale(&self, identity: &Identity) {
		self.state.lock().stale.insert(identity.clone());
	}

	/// Flags `used` as stale only if it is still the stored credential for `identity`.
	///
	/// A request that failed with an old credential must not invalidate a newer one installed
	/// by a concurrent refresh.
	pub fn mark_stale_if_current(&self, identity: &Identity, used: &Credential) -> StaleOutcome {
		let mut state = self.state.lock();
		let outcome = match state.get(identity) {
			Some(current) if current == used => StaleOutcome::Marked,
			Some(_) => StaleOutcome::Superseded,
			None => StaleOutcome::Missing,
		};

		if outcome == StaleOutcome::Marked {
			state.stale.insert(identity.clone());
		}

		outcome
	}

	/// Returns `true` when `identity` is flagged stale.
	pub fn is_stale(&self, identity: &Identity) -> bool {
		self.state.lock().stale.contains(identity)
	}

	/// Logs `user` out: removes the credential from memory and persistence.
	pub fn delete(&self, user: &UserId) -> Result<Option<Credential>> {
		let removed = self.delete_identity(&Identity::User(user.clone()))?;

		if let (Some(hook), Some(_)) = (&self.logout_hook, &removed) {
			hook(user);
		}

		Ok(removed)
	}

	/// Clears the guest session.
	pub fn delete_guest(&self) -> Result<Option<Credential>> {
		self.delete_identity(&Identity::Guest)
	}

	/// Identifiers of every stored user, sorted.
	pub fn user_ids(&self) -> Vec<UserId> {
		let mut ids = self.state.lock().users.keys().cloned().collect::<Vec<_>>();

		ids.sort();

		ids
	}

	/// Strategy refreshing credentials of `kind`.
	pub fn strategy_for(&self, kind: CredentialKind) -> &Arc<dyn RefreshStrategy> {
		self.strategies.for_kind(kind)
	}

	/// Refresh counters for this store.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		&self.refresh_metrics
	}

	/// Decides, atomically, how a signing operation obtains a credential for `identity`.
	pub(crate) fn resolve(self: &Arc<Self>, identity: &Identity, now: OffsetDateTime) -> Resolution {
		let mut state = self.state.lock();

		if let Some(marker) = state.refreshing.get(identity) {
			self.refresh_metrics.record_coalesced();

			return Resolution::Wait(RefreshWaiter(marker.receiver.clone()));
		}

		let current = state.get(identity).cloned();
		let usable = current.as_ref().is_some_and(|credential| {
			!state.stale.contains(identity)
				&& !self.strategy_for(identity.kind()).probably_expired(credential, now)
		});

		match current {
			Some(credential) if usable => Resolution::Ready(credential),
			None if identity.kind() == CredentialKind::User => Resolution::Missing,
			stale => {
				let id = self.next_lease.fetch_add(1, Ordering::Relaxed);
				let (sender, receiver) = watch::channel(None);

				state.refreshing.insert(identity.clone(), RefreshMarker { id, receiver });
				self.refresh_metrics.record_started();

				Resolution::Refresh(RefreshLease {
					store: self.clone(),
					identity: identity.clone(),
					stale,
					id,
					sender,
					completed: false,
				})
			},
		}
	}

	fn finish_refresh(
		&self,
		identity: &Identity,
		id: u64,
		stale: Option<&Credential>,
		result: Result<Credential>,
	) -> Result<Credential> {
		let mut state = self.state.lock();

		if state.refreshing.get(identity).is_none_or(|marker| marker.id != id) {
			// The identity was deleted while refreshing.
			return Err(Error::NoCredentialAvailable { kind: identity.kind() });
		}

		state.refreshing.remove(identity);

		// A save during the refresh (a re-login) wins over the refreshed credential.
		if let Some(current) = state.get(identity).filter(|current| Some(*current) != stale) {
			obs::debug_event!(identity = %identity, "credential replaced while refreshing");

			return Ok(current.clone());
		}

		let credential = result?;

		if credential.identity() != identity {
			return Err(ConfigError::IdentityMismatch {
				expected: identity.to_string(),
				actual: credential.identity().to_string(),
			}
			.into());
		}

		self.write_blob(&credential)?;
		state.stale.remove(identity);
		state.insert(credential.clone());

		Ok(credential)
	}

	fn abandon_refresh(&self, identity: &Identity, id: u64) {
		let mut state = self.state.lock();

		if state.refreshing.get(identity).is_some_and(|marker| marker.id == id) {
			state.refreshing.remove(identity);
		}
	}

	fn delete_identity(&self, identity: &Identity) -> Result<Option<Credential>> {
		let mut state = self.state.lock();

		self.persistence.delete(&BlobKey::for_identity(identity))?;

		Ok(state.remove(identity))
	}

	fn write_blob(&self, credential: &Credential) -> Result<(), StoreError> {
		let blob = serde_json::to_vec(credential).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize {} credential: {e}", credential.kind()),
		})?;

		self.persistence.put(&BlobKey::for_identity(credential.identity()), &blob)
	}

	fn read_blob(&self, key: &BlobKey) -> Result<Option<Credential>, StoreError> {
		let Some(blob) = self.persistence.get(key)? else {
			return Ok(None);
		};

		match serde_json::from_slice::<Credential>(&blob) {
			Ok(credential) if BlobKey::for_identity(credential.identity()) == *key =>
				Ok(Some(credential)),
			Ok(_) => {
				obs::warn_event!(key = %key.identity, "persisted credential belongs to another key");

				Ok(None)
			},
			Err(_e) => {
				obs::warn_event!(key = %key.identity, error = %_e, "skipping undecodable credential");

				Ok(None)
			},
		}
	}
}
impl Debug for CredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("CredentialStore")
			.field("guest", &state.guest.is_some())
			.field("users", &state.users.len())
			.field("stale", &state.stale.len())
			.field("refreshing", &state.refreshing.len())
			.field("strategies", &self.strategies)
			.finish()
	}
}
