pub use crate::config::{
    ExecSettings, QueryConfig, QueryConfigBuilder, ShuffleMode, TimeLiteralFormat, TimeRange,
    Verbosity,
};
pub use crate::error::{Error, Result};
pub use crate::partition::{Partitioner, SubQuery, SubQueryKind};
pub use crate::query::{QueryTemplate, TimeClause};
pub use crate::schema::{DataType, Field, Schema};
pub use crate::table::{Column, ColumnData, Table};
