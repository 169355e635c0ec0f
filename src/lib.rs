#![forbid(unsafe_code)]
//! chronofetch: time-windowed, cache-aware parallel extraction.
//!
//! A `QueryConfig` is split by the partitioner into hour-windowed
//! sub-queries, each bound to a cache segment. The `Engine` fetches the
//! missing segments through a worker pool and merges all of them into a
//! sorted CSV file or an in-memory `Table`.
//!
//! ```rust,no_run
//! use chronofetch::prelude::*;
//! # fn run(backend: &dyn Backend) -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let config = QueryConfig::builder(["events-2024.01.15"], "`@timestamp`, user", "type", "login")
//!     .window_hours(6)
//!     .persist_cache(true)
//!     .build()?;
//! let outcome = Engine::new(ExecSettings::default()).run(&config, backend)?;
//! println!("{} errors", outcome.report.errors);
//! # Ok(())
//! # }
//! ```

pub use chronofetch_core;
pub use chronofetch_exec;
pub use chronofetch_io;

pub mod prelude {
    pub use chronofetch_core::prelude::*;
    pub use chronofetch_exec::{Backend, BackendError, Engine, ExecError, Output, RunOutcome, RunReport};
    pub use chronofetch_io::{CacheDir, RunLog};
}
