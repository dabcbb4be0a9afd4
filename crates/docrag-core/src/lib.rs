//! # docrag Core
//!
//! Shared, WASM-safe logic for docrag: record types, sliding-window
//! chunking, the [`store::Store`] abstraction, vector utilities, and the
//! similarity ranking used by retrieval.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! Everything that talks to a provider or a database lives in the `docrag`
//! application package.

pub mod chunk;
pub mod embedding;
pub mod models;
pub mod search;
pub mod store;
