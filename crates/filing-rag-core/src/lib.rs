//! # filing-rag core
//!
//! Shared, runtime-free logic for filing-rag: data models, the error
//! taxonomy, the fixed-window chunker, capability traits for embedding and
//! text generation, the vector store abstraction, retrieval ranking, and
//! grounding-context assembly.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Network clients,
//! retry timing, SQLite persistence, and the per-company orchestrator live
//! in the `filing-rag` application crate.

pub mod chunk;
pub mod context;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod models;
pub mod prompt;
pub mod report;
pub mod retrieve;
pub mod store;

pub use error::{PipelineError, ServiceError};
