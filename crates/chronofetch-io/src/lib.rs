#![forbid(unsafe_code)]
//! chronofetch-io: everything that touches the file system.
//!
//! - `cache`: the hashed per-configuration cache directory.
//! - `segment`: checksummed, compressed cache files holding one `Table` each.
//! - `metadata`: the human-readable `INFO.md` describing a cache directory.
//! - `runlog`: per-run log sink mirrored to `tracing`.
//! - `writers`: CSV output.

pub mod cache;
pub mod error;
pub mod metadata;
pub mod runlog;
pub mod segment;
pub mod writers;

pub use cache::CacheDir;
pub use runlog::RunLog;
