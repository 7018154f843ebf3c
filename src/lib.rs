//! # Memory Harness
//!
//! A local Markdown workspace served to a browser editor, with live change
//! notifications and literal, ranked, and semantic search.
//!
//! The filesystem is the single source of truth. Everything else (the
//! corpus index, the embedding cache) is derived and can be rebuilt.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌───────────────┐
//!   editor UI ───▶│  HTTP / WS    │
//!                 └──────┬────────┘
//!                        ▼
//!                 ┌───────────────┐      ┌────────────┐
//!                 │   Workspace   │◀─────│  watcher   │◀── disk
//!                 └──┬────┬────┬──┘      └────────────┘
//!                    ▼    ▼    ▼
//!               store  index  semantic cache ──▶ embedding provider
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`sandbox`] | Client path validation |
//! | [`store`] | Atomic document reads and writes |
//! | [`extract`] | Tags, wikilinks, titles, fingerprints |
//! | [`index`] | Literal, BM25, tag, and link indices |
//! | [`concurrency`] | Version-checked writes |
//! | [`watch`] | Filesystem events and debouncing |
//! | [`broadcast`] | WebSocket fan-out |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`semantic`] | Persistent embedding cache and vector search |
//! | [`settings`] | Runtime embedding settings |
//! | [`workspace`] | The service tying it together |
//! | [`server`] | HTTP and WebSocket API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod broadcast;
pub mod concurrency;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod migrate;
pub mod models;
pub mod sandbox;
pub mod semantic;
pub mod server;
pub mod settings;
pub mod store;
pub mod watch;
pub mod workspace;
