//! # Zelos
//!
//! An embedded, file-based JSON document database with:
//! - One append-only, checksummed backing file per collection
//! - Crash recovery by replay with torn-tail truncation
//! - Single-writer/multi-reader concurrency per collection
//! - Compaction by atomic file replacement
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Container                            │
//! │             (name → Collection, lazy open/close)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Collection                            │
//! │            (Single Writer / Multi Reader, cache)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │    Index    │          │ File Store  │
//!   │  (RwLock)   │          │  (Append)   │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │    Codec    │
//!                           │  (Records)  │
//!                           └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use serde_json::json;
//! use zelos::{Config, Container, Document};
//!
//! # fn main() -> zelos::Result<()> {
//! let container = Container::open(Config::builder().base_dir("./data").build())?;
//! let users = container.get_or_open_collection("users")?;
//!
//! users.put(Document::new("u1", json!({ "name": "Ada" })))?;
//! assert_eq!(users.get("u1")?.value["name"], "Ada");
//!
//! container.close_all()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod store;
pub mod index;
pub mod collection;
pub mod container;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, ZelosError};
pub use config::{Config, SyncStrategy};
pub use codec::Document;
pub use collection::{Collection, CollectionState, CollectionStats, Query};
pub use container::Container;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Zelos
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
