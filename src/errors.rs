use thiserror::Error;

/// Error type shared by every stage of the time-pressure pipeline
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Reading or writing a CSV record failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// PGN text could not be read
    #[error("PGN error: {0}")]
    Pgn(String),
    /// A `[%clk ...]` annotation could not be parsed
    #[error("Malformed clock annotation '{annotation}': {reason}")]
    ClockAnnotation { annotation: String, reason: String },
    /// A SAN move did not match any legal move in the replayed position
    #[error("Illegal move '{san}' at ply {ply}")]
    IllegalMove { san: String, ply: usize },
    /// The engine process failed to start, crashed, or answered nonsense
    #[error("Engine error: {0}")]
    Engine(String),
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Aggregation found no usable rows for any player
    #[error("No valid player data found")]
    NoData,
    /// Error with context about the operation that produced it
    #[error("{context}: {source}")]
    Chained {
        #[source]
        source: Box<AnalysisError>,
        context: String,
    },
}

impl AnalysisError {
    /// Wrap this error with a description of the failing operation
    pub fn context(self, context: impl Into<String>) -> Self {
        AnalysisError::Chained {
            source: Box::new(self),
            context: context.into(),
        }
    }

    /// Innermost error of a context chain
    pub fn root(&self) -> &AnalysisError {
        match self {
            AnalysisError::Chained { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<toml::de::Error> for AnalysisError {
    fn from(error: toml::de::Error) -> Self {
        AnalysisError::Configuration(format!("TOML parse error: {error}"))
    }
}

// Convenience type alias
pub type Result<T> = std::result::Result<T, AnalysisError>;

#[macro_export]
macro_rules! engine_error {
    ($msg:expr) => {
        $crate::errors::AnalysisError::Engine($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::AnalysisError::Engine(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::errors::AnalysisError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::AnalysisError::Configuration(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! clock_error {
    ($annotation:expr, $reason:expr) => {
        $crate::errors::AnalysisError::ClockAnnotation {
            annotation: $annotation.to_string(),
            reason: $reason.to_string(),
        }
    };
}
