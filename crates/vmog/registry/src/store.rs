use crate::error::StoreError;
use async_trait::async_trait;
use semver::Version;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use vmog_types::{ModuleKey, VMogRegistryEntry};

/// Durable catalog of published module versions.
///
/// Writes are optimistic: every stored record carries a `revision` that is
/// bumped on each write, and `update` only succeeds against the revision
/// the caller read.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Insert a new record at revision 1. Fails if the version exists.
    async fn insert(&self, entry: VMogRegistryEntry) -> Result<VMogRegistryEntry, StoreError>;

    /// Exact lookup by version.
    async fn get(
        &self,
        key: &ModuleKey,
        version: &Version,
    ) -> Result<Option<VMogRegistryEntry>, StoreError>;

    /// Exact lookup by commit hash.
    async fn find_by_commit(
        &self,
        key: &ModuleKey,
        commit_hash: &str,
    ) -> Result<Option<VMogRegistryEntry>, StoreError>;

    /// All versions of a module, ascending.
    async fn versions(&self, key: &ModuleKey) -> Result<Vec<VMogRegistryEntry>, StoreError>;

    /// Replace a record if its stored revision equals `expected_revision`.
    async fn update(
        &self,
        entry: VMogRegistryEntry,
        expected_revision: u64,
    ) -> Result<VMogRegistryEntry, StoreError>;

    /// Every record, ordered by key then version.
    async fn list(&self) -> Result<Vec<VMogRegistryEntry>, StoreError>;

    /// Total record count.
    async fn count(&self) -> Result<usize, StoreError>;
}

type Catalog = HashMap<ModuleKey, BTreeMap<Version, VMogRegistryEntry>>;

/// In-memory registry store for testing and development.
#[derive(Clone, Default)]
pub struct InMemoryRegistryStore {
    entries: Arc<RwLock<Catalog>>,
    fail_next: Arc<AtomicU32>,
}

impl InMemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` operations fail with `Unavailable`.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Bump a record's revision behind the caller's back.
    pub fn touch(&self, key: &ModuleKey, version: &Version) -> Result<(), StoreError> {
        let mut store = self.write()?;
        let entry = store
            .get_mut(key)
            .and_then(|versions| versions.get_mut(version))
            .ok_or_else(|| StoreError::NotFound(key.at(version.clone()).to_string()))?;
        entry.revision += 1;
        Ok(())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        match self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(_) => Err(StoreError::Unavailable("injected failure".into())),
            Err(_) => Ok(()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Catalog>, StoreError> {
        self.entries
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Catalog>, StoreError> {
        self.entries
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistryStore {
    async fn insert(&self, mut entry: VMogRegistryEntry) -> Result<VMogRegistryEntry, StoreError> {
        self.check_available()?;
        let mut store = self.write()?;
        let versions = store.entry(entry.key()).or_default();
        if versions.contains_key(&entry.version) {
            return Err(StoreError::AlreadyExists(entry.module_ref().to_string()));
        }
        entry.revision = 1;
        versions.insert(entry.version.clone(), entry.clone());
        Ok(entry)
    }

    async fn get(
        &self,
        key: &ModuleKey,
        version: &Version,
    ) -> Result<Option<VMogRegistryEntry>, StoreError> {
        self.check_available()?;
        let store = self.read()?;
        Ok(store.get(key).and_then(|v| v.get(version)).cloned())
    }

    async fn find_by_commit(
        &self,
        key: &ModuleKey,
        commit_hash: &str,
    ) -> Result<Option<VMogRegistryEntry>, StoreError> {
        self.check_available()?;
        let store = self.read()?;
        Ok(store.get(key).and_then(|versions| {
            versions
                .values()
                .rev()
                .find(|e| e.commit_hash == commit_hash)
                .cloned()
        }))
    }

    async fn versions(&self, key: &ModuleKey) -> Result<Vec<VMogRegistryEntry>, StoreError> {
        self.check_available()?;
        let store = self.read()?;
        Ok(store
            .get(key)
            .map(|v| v.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn update(
        &self,
        mut entry: VMogRegistryEntry,
        expected_revision: u64,
    ) -> Result<VMogRegistryEntry, StoreError> {
        self.check_available()?;
        let mut store = self.write()?;
        let current = store
            .get_mut(&entry.key())
            .and_then(|versions| versions.get_mut(&entry.version))
            .ok_or_else(|| StoreError::NotFound(entry.module_ref().to_string()))?;
        if current.revision != expected_revision {
            return Err(StoreError::RevisionMismatch {
                key: entry.module_ref().to_string(),
                expected: expected_revision,
                actual: current.revision,
            });
        }
        entry.revision = expected_revision + 1;
        *current = entry.clone();
        Ok(entry)
    }

    async fn list(&self) -> Result<Vec<VMogRegistryEntry>, StoreError> {
        self.check_available()?;
        let store = self.read()?;
        let mut keys: Vec<&ModuleKey> = store.keys().collect();
        keys.sort();
        Ok(keys
            .into_iter()
            .flat_map(|k| store[k].values().cloned())
            .collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.check_available()?;
        let store = self.read()?;
        Ok(store.values().map(BTreeMap::len).sum())
    }
}
