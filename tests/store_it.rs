mod common;

// std
use std::{
	env, fs,
	path::{Path, PathBuf},
	process,
	sync::Arc,
};
// crates.io
use color_eyre::Result;
use parking_lot::Mutex;
// self
use auth_pipeline::{
	auth::{AppCredentials, Credential, CredentialMaterial},
	refresh::RefreshStrategies,
	store::{AuthConfigOutcome, CredentialStore, FilePersistence},
};
use common::*;

fn temp_path(label: &str) -> PathBuf {
	let unique = format!(
		"auth_pipeline_store_it_{label}_{}_{}.json",
		process::id(),
		time::OffsetDateTime::now_utc().unix_timestamp_nanos(),
	);

	env::temp_dir().join(unique)
}

fn open(path: &Path, app: &AppCredentials) -> Result<(CredentialStore, AuthConfigOutcome)> {
	let persistence = Arc::new(FilePersistence::open(path)?);
	let strategies = RefreshStrategies::new(
		Arc::new(ScriptedRefreshStrategy::numbered_guest()),
		Arc::new(ScriptedRefreshStrategy::numbered_user()),
	);
	let store = CredentialStore::new(persistence, strategies);
	let outcome = store.validate_auth_config(app)?;

	store.load()?;

	Ok((store, outcome))
}

#[test]
fn sessions_survive_restart_with_the_same_app() -> Result<()> {
	let path = temp_path("restart");
	let (store, outcome) = open(&path, &app())?;

	assert_eq!(outcome, AuthConfigOutcome::FirstRun);

	store.save(Credential::guest("app-bearer", "guest-1"))?;
	store.save(Credential::user(user("42"), "42-token", "42-secret"))?;
	store.save(Credential::user(user("7"), "7-token", "7-secret"))?;
	store.delete(&user("7"))?;
	drop(store);

	let (reopened, outcome) = open(&path, &app())?;

	assert_eq!(outcome, AuthConfigOutcome::Unchanged);
	assert!(reopened.current_guest_credential().is_some());
	assert_eq!(reopened.user_ids(), vec![user("42")]);
	assert!(reopened.credential_for(&user("42")).is_some());

	fs::remove_file(&path)?;

	Ok(())
}

#[test]
fn changing_app_keys_purges_persisted_sessions() -> Result<()> {
	let path = temp_path("purge");
	let (store, _) = open(&path, &app())?;

	store.save(Credential::guest("app-bearer", "guest-1"))?;
	store.save(Credential::user(user("42"), "42-token", "42-secret"))?;
	drop(store);

	let rotated = AppCredentials::new("rotated-key", "rotated-secret");
	let (reopened, outcome) = open(&path, &rotated)?;

	assert_eq!(outcome, AuthConfigOutcome::Purged { removed: 2 });
	assert!(reopened.current_guest_credential().is_none());
	assert!(reopened.user_ids().is_empty());
	drop(reopened);

	// The new fingerprint is now the recorded one.
	let (_, outcome) = open(&path, &rotated)?;

	assert_eq!(outcome, AuthConfigOutcome::Unchanged);

	fs::remove_file(&path)?;

	Ok(())
}

#[test]
fn open_validates_then_loads() -> Result<()> {
	let path = temp_path("open");
	let strategies = || {
		RefreshStrategies::new(
			Arc::new(ScriptedRefreshStrategy::numbered_guest()),
			Arc::new(ScriptedRefreshStrategy::numbered_user()),
		)
	};
	let store =
		CredentialStore::open(Arc::new(FilePersistence::open(&path)?), strategies(), &app())?;

	store.save(Credential::user(user("42"), "42-token", "42-secret"))?;
	drop(store);

	let reopened =
		CredentialStore::open(Arc::new(FilePersistence::open(&path)?), strategies(), &app())?;

	assert_eq!(reopened.user_ids(), vec![user("42")]);

	fs::remove_file(&path)?;

	Ok(())
}

#[test]
fn failed_saves_are_not_resurrected_on_restart() -> Result<()> {
	let path = temp_path("blocked");
	let (store, _) = open(&path, &app())?;

	store.save(Credential::user(user("42"), "42-token", "42-secret"))?;

	let blocker = path.with_extension("tmp");

	fs::create_dir(&blocker)?;

	assert!(store.save(Credential::user(user("7"), "7-token", "7-secret")).is_err());
	assert!(store.delete(&user("42")).is_err());
	assert_eq!(store.user_ids(), vec![user("42")]);
	assert_eq!(store.load()?, 1);
	assert_eq!(store.user_ids(), vec![user("42")]);

	fs::remove_dir(&blocker)?;
	drop(store);

	let (reopened, _) = open(&path, &app())?;

	assert_eq!(reopened.user_ids(), vec![user("42")]);

	fs::remove_file(&path)?;

	Ok(())
}

#[tokio::test]
async fn verified_logins_are_saved_and_announced() -> Result<()> {
	let path = temp_path("verified");
	let saved = Arc::new(Mutex::new(Vec::new()));
	let logged_out = Arc::new(Mutex::new(Vec::new()));
	let verifier = Arc::new(ScriptedRefreshStrategy::numbered_user());
	let store = {
		let saved = saved.clone();
		let logged_out = logged_out.clone();
		let strategies =
			RefreshStrategies::new(Arc::new(ScriptedRefreshStrategy::numbered_guest()), verifier.clone());

		CredentialStore::open(Arc::new(FilePersistence::open(&path)?), strategies, &app())?
			.with_save_hook(move |credential: &Credential| saved.lock().push(credential.clone()))
			.with_logout_hook(move |user: &auth_pipeline::auth::UserId| {
				logged_out.lock().push(user.clone())
			})
	};
	let verified =
		store.save_verified(Credential::user(user("42"), "42-login", "42-secret")).await?;

	match verified.material() {
		CredentialMaterial::User { token, .. } => assert_eq!(token.expose(), "42-token-1"),
		other => panic!("Unexpected material: {other:?}."),
	}

	assert_eq!(verifier.call_count(), 1);
	assert_eq!(store.credential_for(&user("42")), Some(verified.clone()));
	assert_eq!(*saved.lock(), vec![verified]);

	store.delete(&user("42"))?;

	assert_eq!(*logged_out.lock(), vec![user("42")]);
	assert!(store.user_ids().is_empty());

	drop(store);
	fs::remove_file(&path)?;

	Ok(())
}
