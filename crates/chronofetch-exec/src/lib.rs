#![forbid(unsafe_code)]
//! chronofetch-exec: runs a planned extraction against a backend.
//!
//! - `backend`: the `Backend` trait implemented by data sources.
//! - `scheduler`: bounded worker pool that fetches uncached sub-queries.
//! - `telemetry`: background memory sampler and its stop signal.
//! - `progress`: completion counter with periodic log lines.
//! - `aggregate` / `compress`: merge cache segments into the final result.
//! - `runtime`: the `Engine` tying the stages together, with teardown.

pub mod aggregate;
pub mod backend;
pub mod compress;
pub mod error;
pub mod progress;
pub mod runtime;
pub mod scheduler;
pub mod telemetry;

pub use backend::Backend;
pub use error::{BackendError, ExecError};
pub use runtime::{Engine, Output, RunOutcome, RunReport};
