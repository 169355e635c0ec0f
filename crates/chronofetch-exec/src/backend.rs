//! Data source seam.

use std::sync::Arc;

use chronofetch_core::table::Table;

use crate::error::BackendError;

/// A queryable store. Implementations are shared across fetch workers, so
/// `fetch` must be callable concurrently.
pub trait Backend: Send + Sync {
    /// Time field used in rendered clauses when the configuration has no
    /// override.
    fn default_time_field(&self) -> &str;

    /// Run `query` and return its rows. `columns` are the normalized names
    /// the result table is expected to carry.
    fn fetch(&self, query: &str, columns: &[String]) -> Result<Table, BackendError>;
}

impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn default_time_field(&self) -> &str {
        (**self).default_time_field()
    }

    fn fetch(&self, query: &str, columns: &[String]) -> Result<Table, BackendError> {
        (**self).fetch(query, columns)
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn default_time_field(&self) -> &str {
        (**self).default_time_field()
    }

    fn fetch(&self, query: &str, columns: &[String]) -> Result<Table, BackendError> {
        (**self).fetch(query, columns)
    }
}
