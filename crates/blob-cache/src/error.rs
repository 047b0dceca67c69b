//! Error types for the blob cache

use std::fmt;
use std::io;
use std::sync::Arc;

/// Errors from cache backends and the cached-compute helper.
///
/// IO errors are held behind `Arc` so the error can be cloned out of a
/// shared in-flight computation to every waiting caller.
#[derive(Debug, Clone)]
pub enum CacheError {
    /// A put would exceed the named-store quota
    QuotaExceeded { needed: u64, available: u64 },
    /// The filesystem reported that it is out of space
    StorageFull(Arc<io::Error>),
    /// The platform storage could not be opened
    BackendUnavailable(String),
    UnknownNamespace(String),
    Io(Arc<io::Error>),
    /// An entry's metadata header could not be read or written
    Metadata(String),
    /// The caller's producer failed
    Compute(String),
    Config(String),
}

impl CacheError {
    /// Faults confined to the storage layer. The cached-compute helper
    /// swallows these at the put step.
    pub fn is_storage_fault(&self) -> bool {
        matches!(
            self,
            CacheError::QuotaExceeded { .. }
                | CacheError::StorageFull(_)
                | CacheError::Io(_)
                | CacheError::Metadata(_)
        )
    }

    /// Build a compute error from any displayable producer error
    pub fn compute(err: impl fmt::Display) -> Self {
        CacheError::Compute(err.to_string())
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::QuotaExceeded { needed, available } => write!(
                f,
                "Quota exceeded: needed {} bytes, {} available",
                needed, available
            ),
            CacheError::StorageFull(err) => write!(f, "Storage full: {}", err),
            CacheError::BackendUnavailable(msg) => write!(f, "Backend unavailable: {}", msg),
            CacheError::UnknownNamespace(name) => write!(f, "Unknown namespace: {}", name),
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::Metadata(msg) => write!(f, "Metadata error: {}", msg),
            CacheError::Compute(msg) => write!(f, "Compute error: {}", msg),
            CacheError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::StorageFull(err) | CacheError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for CacheError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::StorageFull => CacheError::StorageFull(Arc::new(err)),
            _ => CacheError::Io(Arc::new(err)),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Metadata(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_error_display() {
        let err = CacheError::QuotaExceeded {
            needed: 512,
            available: 100,
        };
        assert_eq!(
            format!("{}", err),
            "Quota exceeded: needed 512 bytes, 100 available"
        );
    }

    #[test]
    fn test_unknown_namespace_display() {
        let err = CacheError::UnknownNamespace("avatars".to_string());
        assert_eq!(format!("{}", err), "Unknown namespace: avatars");
    }

    #[test]
    fn test_io_error_classification() {
        let full: CacheError = io::Error::new(io::ErrorKind::StorageFull, "no space").into();
        assert!(matches!(full, CacheError::StorageFull(_)));

        let denied: CacheError =
            io::Error::new(io::ErrorKind::PermissionDenied, "read-only").into();
        assert!(matches!(denied, CacheError::Io(_)));
    }

    #[test]
    fn test_storage_fault_classification() {
        assert!(CacheError::QuotaExceeded {
            needed: 1,
            available: 0
        }
        .is_storage_fault());
        assert!(CacheError::Metadata("bad json".to_string()).is_storage_fault());
        assert!(!CacheError::BackendUnavailable("gone".to_string()).is_storage_fault());
        assert!(!CacheError::compute("timeout").is_storage_fault());
    }

    #[test]
    fn test_error_source() {
        use std::error::Error;

        let err: CacheError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(err.source().is_some());
        assert!(CacheError::Config("x".to_string()).source().is_none());
    }
}
