//! # Note Sync
//!
//! Auto-save synchronization between a live note editor and a block store.
//!
//! Editor changes are extracted to clean markup, debounced, and upserted
//! into the store as fragments. A per-note pointer makes consecutive saves
//! update one fragment in place, and a sequence guard keeps late responses
//! from clobbering newer state. On open, the most recently edited fragment
//! seeds the editor.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Editor  │──▶│ Extractor │──▶│ Debouncer │──▶│ Coordinator │──▶│   Gateway    │
//! └──────────┘   └───────────┘   └───────────┘   └──────┬──────┘   │ HTTP / local │
//!      ▲                                                 │          └──────┬───────┘
//!      │                                          ┌──────▼─────┐           │
//!      └────────────── Bootstrap ◀────────────────│  Pointers  │    ┌──────▼───────┐
//!                                                 └────────────┘    │ Block store  │
//!                                                                   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! nsync init                          # create database
//! nsync serve &                       # start the block store server
//! nsync note create "Groceries"       # prints the new note id
//! nsync save 1 --file draft.html      # one-shot save
//! nsync watch 1 --file draft.html     # auto-save on every change
//! nsync open 1                        # print the content bootstrap would load
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`debounce`] | Trailing-edge change debouncer |
//! | [`coordinator`] | Save pointer and stale-response guard |
//! | [`gateway`] | Store boundary and failure classification |
//! | [`bootstrap`] | Initial content selection and editor seeding |
//! | [`session`] | Per-note edit pipeline |
//! | [`pointer_file`] | File-backed pointer slot |
//! | [`server`] | Block store HTTP server |
//! | [`sqlite_store`] | SQLite block store |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`logging`] | Tracing subscriber setup |
//!
//! Markup extraction, the data model, selection rules, and the store trait
//! live in the `note-sync-core` crate.

pub mod bootstrap;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod debounce;
pub mod gateway;
pub mod logging;
pub mod migrate;
pub mod pointer_file;
pub mod server;
pub mod session;
pub mod sqlite_store;
