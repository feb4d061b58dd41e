//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait defines what the indexer and retriever need
//! from persistent storage: one logical collection per company, built by
//! copy-then-swap so a half-written version is never visible.
//!
//! # Build protocol
//!
//! | Step | Method |
//! |------|--------|
//! | claim the company's build marker | [`try_acquire_build`](VectorStore::try_acquire_build) |
//! | write every passage under a fresh version id | [`stage_passages`](VectorStore::stage_passages) |
//! | repoint the collection, drop the old version | [`commit_collection`](VectorStore::commit_collection) |
//! | on failure, remove the staged rows | [`discard_version`](VectorStore::discard_version) |
//! | always release the marker | [`release_build`](VectorStore::release_build) |
//!
//! Readers only ever see the version a collection currently points at.
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CollectionInfo, IndexedPassage};

/// Abstract storage backend for per-company index collections.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Metadata of the live collection for `company`, if one exists.
    async fn collection(&self, company: &str) -> Result<Option<CollectionInfo>>;

    /// The live collection with every passage and vector, ordered by `seq`.
    async fn load_collection(
        &self,
        company: &str,
    ) -> Result<Option<(CollectionInfo, Vec<IndexedPassage>)>>;

    /// Claim the build-in-progress marker for `company`.
    ///
    /// Returns `false` if another build holds a marker younger than
    /// `stale_after_secs`. Older markers are treated as abandoned and
    /// taken over.
    async fn try_acquire_build(
        &self,
        company: &str,
        version: &str,
        stale_after_secs: i64,
    ) -> Result<bool>;

    /// Release the marker if it is still held by `version`.
    async fn release_build(&self, company: &str, version: &str) -> Result<()>;

    /// Write passages under `version` without making them visible.
    async fn stage_passages(
        &self,
        company: &str,
        version: &str,
        passages: &[IndexedPassage],
    ) -> Result<()>;

    /// Atomically point `info.company_code` at `info.version` and delete
    /// every other version of that company: the one it pointed at before
    /// and any left staged by a build that never finished. Returns the
    /// previous live version id.
    async fn commit_collection(&self, info: &CollectionInfo) -> Result<Option<String>>;

    /// Delete the rows of a staged version that will never be committed.
    async fn discard_version(&self, company: &str, version: &str) -> Result<()>;

    /// Remove a company's collection and any abandoned staged rows, keeping
    /// only those of a build that currently holds the marker. Returns
    /// whether a collection existed.
    async fn drop_collection(&self, company: &str) -> Result<bool>;

    /// Metadata of every live collection, ordered by company code.
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;
}
