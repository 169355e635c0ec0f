use thiserror::Error;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unsupported output format: {0}")]
    UnsupportedOutputFormat(String),

    #[error("Table error: {0}")]
    Table(String),

    #[error("Time parse error: {0}")]
    TimeParse(String),

    /// Error with context chain for better debugging
    #[error("Error in {context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    /// Add context to an error, creating an error chain.
    ///
    /// # Example
    /// ```rust,no_run
    /// use chronofetch_core::error::Error;
    /// let err = Error::Table("column length mismatch".into());
    /// let err = err.with_context("while concatenating cache segments");
    /// ```
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self) as Box<dyn std::error::Error + Send + Sync>,
        }
    }

    /// True for errors raised while validating a configuration.
    pub fn is_configuration(&self) -> bool {
        match self {
            Error::InvalidConfiguration(_) | Error::UnsupportedOutputFormat(_) => true,
            Error::Context { source, .. } => source
                .downcast_ref::<Error>()
                .map(Error::is_configuration)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Get suggestions for common errors.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Error::InvalidConfiguration(msg) => {
                if msg.contains("fields") {
                    vec![
                        "List fields as `a`, b, `c.d` separated by \", \"".into(),
                        "Wildcards (*) are not allowed; name every column".into(),
                    ]
                } else if msg.contains("time range") || msg.contains("bound") {
                    vec!["Set both start and end of the time range, or neither".into()]
                } else if msg.contains("window") {
                    vec!["Window size must be a whole number of hours between 1 and 12".into()]
                } else {
                    vec![]
                }
            }
            Error::UnsupportedOutputFormat(_) => {
                vec![
                    "Only .csv output files are supported".into(),
                    "Use return_table to receive the result in memory instead".into(),
                ]
            }
            Error::TimeParse(_) => {
                vec!["Check that the sort column holds RFC 3339 timestamps or epoch milliseconds".into()]
            }
            _ => vec![],
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidConfiguration(e.to_string())
    }
}
