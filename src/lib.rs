//! # filing-rag
//!
//! Retrieval-grounded summaries of annual securities filings.
//!
//! For every configured company the pipeline extracts the filing's text,
//! splits it into overlapping passages, embeds them into a per-company index
//! collection in SQLite, retrieves the passages most relevant to a set of
//! topic queries, and asks a language model for one summary grounded in
//! that context.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌──────────┐
//! │ Filings  │──▶│  Chunk   │──▶│   Index    │──▶│  SQLite  │
//! │ PDF/TXT  │   │          │   │ (embed)    │   │ versions │
//! └──────────┘   └──────────┘   └────────────┘   └────┬─────┘
//!                                                     │
//!                 ┌──────────┐   ┌────────────┐       │
//!                 │ Summary  │◀──│  Retrieve  │◀──────┘
//!                 │ (LLM)    │   │ + assemble │
//!                 └──────────┘   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! filing-rag init                    # create database
//! filing-rag companies               # check filings are found
//! filing-rag index build all         # chunk + embed every company
//! filing-rag search 12044 "growth strategy"
//! filing-rag summarize all
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite vector store with copy-then-swap builds |
//! | [`filings`] | Filing discovery and text extraction |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Text-generation providers |
//! | [`http`] | Shared HTTP plumbing and error classification |
//! | [`retry`] | Bounded retry with exponential backoff |
//! | [`indexer`] | Idempotent per-company index builds |
//! | [`retriever`] | Query embedding and top-K retrieval |
//! | [`summarize`] | Summary generation and artifacts |
//! | [`pipeline`] | Per-company orchestration and run reports |
//! | [`progress`] | Progress events on stderr |
//! | [`status`] | Index status and maintenance |
//!
//! Runtime-free logic (chunking, ranking, context assembly, prompts, error
//! taxonomy) lives in the `filing-rag-core` crate.

pub mod config;
pub mod db;
pub mod embedding;
pub mod filings;
pub mod http;
pub mod indexer;
pub mod llm;
pub mod migrate;
pub mod pipeline;
pub mod progress;
pub mod retriever;
pub mod retry;
pub mod sqlite_store;
pub mod status;
pub mod summarize;
