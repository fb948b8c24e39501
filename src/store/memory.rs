//! Thread-safe in-memory [`CredentialPersistence`] for tests and ephemeral sessions.

// self
use crate::{
	_prelude::*,
	store::{BlobKey, BlobKind, CredentialPersistence, StoreError},
};

type BlobMap = Arc<RwLock<HashMap<BlobKey, Vec<u8>>>>;

/// Keeps blobs in-process; clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryPersistence(BlobMap);
impl MemoryPersistence {
	/// Number of stored blobs across every namespace.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl CredentialPersistence for MemoryPersistence {
	fn put(&self, key: &BlobKey, blob: &[u8]) -> Result<(), StoreError> {
		self.0.write().insert(key.clone(), blob.to_vec());

		Ok(())
	}

	fn get(&self, key: &BlobKey) -> Result<Option<Vec<u8>>, StoreError> {
		Ok(self.0.read().get(key).cloned())
	}

	fn delete(&self, key: &BlobKey) -> Result<bool, StoreError> {
		Ok(self.0.write().remove(key).is_some())
	}

	fn keys(&self, kind: BlobKind) -> Result<Vec<BlobKey>, StoreError> {
		let mut keys = self.0.read().keys().filter(|key| key.kind == kind).cloned().collect::<Vec<_>>();

		keys.sort();

		Ok(keys)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn clones_share_blobs_and_keys_filter_by_kind() {
		let persistence = MemoryPersistence::default();
		let shared = persistence.clone();
		let user = BlobKey { kind: BlobKind::User, identity: "42".into() };

		persistence.put(&BlobKey::guest(), b"guest").expect("Put should succeed.");
		persistence.put(&user, b"user").expect("Put should succeed.");

		assert_eq!(shared.len(), 2);
		assert_eq!(shared.keys(BlobKind::User).expect("Keys should list."), vec![user.clone()]);
		assert!(shared.delete(&user).expect("Delete should succeed."));
		assert!(!shared.delete(&user).expect("Delete should succeed."));
		assert_eq!(shared.get(&user).expect("Get should succeed."), None);
	}
}
