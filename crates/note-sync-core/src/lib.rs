//! # Note Sync Core
//!
//! Runtime-free logic for Note Sync: fragment and note models, content
//! extraction, bootstrap selection, the client save-pointer slot, and the
//! block store abstraction.
//!
//! This crate contains no tokio runtime, sqlx, or HTTP client. Everything
//! here is either a pure function or a trait with an in-memory
//! implementation, so the async pipeline in `note-sync` can be tested
//! without a network or a database.

pub mod extract;
pub mod models;
pub mod pointer;
pub mod reconcile;
pub mod store;
