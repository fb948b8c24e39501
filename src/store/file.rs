//! File-backed [`CredentialPersistence`] that survives restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::{
	_prelude::*,
	store::{BlobKey, BlobKind, CredentialPersistence, StoreError},
};

/// Persists blobs to a JSON snapshot after each mutation.
///
/// The snapshot is a list of `[key, base64-blob]` pairs, replaced atomically through a sibling
/// `.tmp` file. The in-memory view only changes once the snapshot was written.
#[derive(Clone, Debug)]
pub struct FilePersistence {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<BlobKey, Vec<u8>>>>,
}
impl FilePersistence {
	/// Opens (or creates) a snapshot at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the snapshot.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<BlobKey, Vec<u8>>, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(HashMap::new());
		}

		let entries: Vec<(BlobKey, String)> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		entries
			.into_iter()
			.map(|(key, encoded)| {
				let blob = STANDARD.decode(encoded).map_err(|e| StoreError::Serialization {
					message: format!("Failed to decode blob {}: {e}", key.identity),
				})?;

				Ok((key, blob))
			})
			.collect()
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &HashMap<BlobKey, Vec<u8>>) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let mut snapshot =
			contents.iter().map(|(key, blob)| (key, STANDARD.encode(blob))).collect::<Vec<_>>();

		snapshot.sort();

		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize credential snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl CredentialPersistence for FilePersistence {
	fn put(&self, key: &BlobKey, blob: &[u8]) -> Result<(), StoreError> {
		let mut guard = self.inner.write();
		let mut next = guard.clone();

		next.insert(key.clone(), blob.to_vec());
		self.persist_locked(&next)?;

		*guard = next;

		Ok(())
	}

	fn get(&self, key: &BlobKey) -> Result<Option<Vec<u8>>, StoreError> {
		Ok(self.inner.read().get(key).cloned())
	}

	fn delete(&self, key: &BlobKey) -> Result<bool, StoreError> {
		let mut guard = self.inner.write();

		if !guard.contains_key(key) {
			return Ok(false);
		}

		let mut next = guard.clone();

		next.remove(key);
		self.persist_locked(&next)?;

		*guard = next;

		Ok(true)
	}

	fn keys(&self, kind: BlobKind) -> Result<Vec<BlobKey>, StoreError> {
		let mut keys =
			self.inner.read().keys().filter(|key| key.kind == kind).cloned().collect::<Vec<_>>();

		keys.sort();

		Ok(keys)
	}
}
