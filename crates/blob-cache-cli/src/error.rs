//! Error types for the blob cache CLI

use std::fmt;

#[derive(Debug)]
pub enum CliError {
    Cache(blob_cache::CacheError),
    Http(Box<reqwest::Error>),
    /// Upstream answered with a non-success status
    Upstream(String),
    /// No entry stored under the requested key
    NotFound(String),
    /// Some namespaces could not be cleared
    ClearIncomplete(usize),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Cache(err) => write!(f, "Cache error: {}", err),
            CliError::Http(err) => write!(f, "HTTP error: {}", err),
            CliError::Upstream(msg) => write!(f, "Upstream error: {}", msg),
            CliError::NotFound(msg) => write!(f, "Not found: {}", msg),
            CliError::ClearIncomplete(count) => {
                write!(f, "Clear incomplete: {} namespace(s) not cleared", count)
            }
            CliError::Io(err) => write!(f, "IO error: {}", err),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Cache(err) => Some(err),
            CliError::Http(err) => Some(err.as_ref()),
            CliError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<blob_cache::CacheError> for CliError {
    fn from(err: blob_cache::CacheError) -> Self {
        CliError::Cache(err)
    }
}

impl From<reqwest::Error> for CliError {
    fn from(err: reqwest::Error) -> Self {
        CliError::Http(Box::new(err))
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for CliError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        CliError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
