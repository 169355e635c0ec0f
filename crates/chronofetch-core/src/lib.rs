#![forbid(unsafe_code)]
//! chronofetch-core: shared kernel for the chronofetch extraction pipeline.
//!
//! This crate contains only *pure* types and helpers. There is **no I/O**
//! and **no threading** here; the partitioner produces cache paths but never
//! touches the file system.
//!
//! Crates that use this:
//! - chronofetch-io: persists `Table`s as cache segments and writes CSV output.
//! - chronofetch-exec: runs the `SubQuery` list produced by the partitioner
//!   against a backend and aggregates the results.

pub mod config;
pub mod error;
pub mod hash;
pub mod partition;
pub mod prelude;
pub mod query;
pub mod schema;
pub mod table;
pub mod timeparse;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
