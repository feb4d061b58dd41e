//! In-memory [`VectorStore`] implementation for tests and dry runs.
//!
//! All state sits behind one `std::sync::RwLock`, so a commit swaps the
//! collection pointer and drops the old version in a single critical
//! section.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{CollectionInfo, IndexedPassage};

use super::VectorStore;

#[derive(Default)]
struct Inner {
    collections: BTreeMap<String, CollectionInfo>,
    /// Passages by (company, version), committed or staged.
    versions: HashMap<(String, String), Vec<IndexedPassage>>,
    /// company -> (version, started_at)
    locks: HashMap<String, (String, i64)>,
}

/// In-memory store for testing.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(company, version)` that still has rows, sorted.
    ///
    /// Lets tests check that failed or replaced builds leave nothing behind.
    pub fn stored_versions(&self) -> Vec<(String, String)> {
        let mut keys: Vec<_> = match self.inner.read() {
            Ok(inner) => inner.versions.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        keys.sort();
        keys
    }

    /// Whether a build marker is currently held for `company`.
    pub fn is_locked(&self, company: &str) -> bool {
        self.inner
            .read()
            .map(|inner| inner.locks.contains_key(company))
            .unwrap_or(false)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn collection(&self, company: &str) -> Result<Option<CollectionInfo>> {
        Ok(self.read()?.collections.get(company).cloned())
    }

    async fn load_collection(
        &self,
        company: &str,
    ) -> Result<Option<(CollectionInfo, Vec<IndexedPassage>)>> {
        let inner = self.read()?;
        let info = match inner.collections.get(company) {
            Some(info) => info.clone(),
            None => return Ok(None),
        };
        let mut passages = inner
            .versions
            .get(&(company.to_string(), info.version.clone()))
            .cloned()
            .unwrap_or_default();
        passages.sort_by_key(|p| p.passage.seq);
        Ok(Some((info, passages)))
    }

    async fn try_acquire_build(
        &self,
        company: &str,
        version: &str,
        stale_after_secs: i64,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let mut inner = self.write()?;
        if let Some((_, started_at)) = inner.locks.get(company) {
            if now - *started_at < stale_after_secs {
                return Ok(false);
            }
        }
        inner
            .locks
            .insert(company.to_string(), (version.to_string(), now));
        Ok(true)
    }

    async fn release_build(&self, company: &str, version: &str) -> Result<()> {
        let mut inner = self.write()?;
        if inner.locks.get(company).map(|(v, _)| v.as_str()) == Some(version) {
            inner.locks.remove(company);
        }
        Ok(())
    }

    async fn stage_passages(
        &self,
        company: &str,
        version: &str,
        passages: &[IndexedPassage],
    ) -> Result<()> {
        let mut inner = self.write()?;
        inner
            .versions
            .insert((company.to_string(), version.to_string()), passages.to_vec());
        Ok(())
    }

    async fn commit_collection(&self, info: &CollectionInfo) -> Result<Option<String>> {
        let mut inner = self.write()?;
        let key = (info.company_code.clone(), info.version.clone());
        let staged = match inner.versions.get(&key) {
            Some(rows) => rows.len(),
            None => {
                return Err(anyhow!(
                    "version {} of {} was never staged",
                    info.version,
                    info.company_code
                ))
            }
        };
        if staged != info.passage_count {
            return Err(anyhow!(
                "version {} of {} has {} staged passages, expected {}",
                info.version,
                info.company_code,
                staged,
                info.passage_count
            ));
        }
        let previous = inner
            .collections
            .insert(info.company_code.clone(), info.clone())
            .map(|old| old.version)
            .filter(|v| v != &info.version);
        // Replaced and abandoned versions of this company go together.
        inner.versions.retain(|(company, version), _| {
            company != &info.company_code || version == &info.version
        });
        Ok(previous)
    }

    async fn discard_version(&self, company: &str, version: &str) -> Result<()> {
        let mut inner = self.write()?;
        let live = inner.collections.get(company).map(|c| c.version.clone());
        if live.as_deref() != Some(version) {
            inner
                .versions
                .remove(&(company.to_string(), version.to_string()));
        }
        Ok(())
    }

    async fn drop_collection(&self, company: &str) -> Result<bool> {
        let mut inner = self.write()?;
        let removed = inner.collections.remove(company).is_some();
        let building = inner.locks.get(company).map(|(v, _)| v.clone());
        inner.versions.retain(|(c, version), _| {
            c != company || building.as_deref() == Some(version.as_str())
        });
        Ok(removed)
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        Ok(self.read()?.collections.values().cloned().collect())
    }
}
