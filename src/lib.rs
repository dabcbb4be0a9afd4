//! # docrag
//!
//! Provider-abstracted document indexing and semantic retrieval.
//!
//! Documents (PDF, DOCX, PPTX, XLSX) are uploaded into collections,
//! split into overlapping chunks, and embedded through whichever provider
//! the collection names: a local runtime such as Ollama or a hosted API.
//! Queries are embedded the same way and answered by cosine-similarity
//! ranking over the stored chunk vectors.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────────────┐      ┌──────────────────┐
//!  │ ProviderRegistry │◀─────│ EmbeddingGateway │◀─────────┐
//!  │ strategies, test │      │  text → vector   │          │
//!  └────────┬─────────┘      └────────▲─────────┘          │
//!           │                         │                    │
//!           ▼                ┌────────┴─────────┐  ┌───────┴────────┐
//!      ┌─────────┐           │IngestionPipeline │  │RetrievalEngine │
//!      │  Store  │◀──────────│ parse→chunk→embed│  │ embed → rank   │
//!      │ SQLite  │◀──────────┴──────────────────┘  └───────┬────────┘
//!      └─────────┘◀────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed errors for every public operation |
//! | [`providers`] | Per-provider wire strategies |
//! | [`registry`] | Provider records, connection tests, model catalogs |
//! | [`gateway`] | Text to embedding vector |
//! | [`extract`] | Text extraction from uploads |
//! | [`ingest`] | Collections, uploads, chunking, batch embedding |
//! | [`tasks`] | Background ingestion status |
//! | [`retrieval`] | Semantic search across collections |
//! | [`sqlite_store`] | SQLite [`Store`](docrag_core::store::Store) |
//! | [`server`] | HTTP API |

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod ingest;
pub mod migrate;
pub mod providers;
pub mod registry;
pub mod retrieval;
pub mod server;
pub mod sqlite_store;
pub mod tasks;
