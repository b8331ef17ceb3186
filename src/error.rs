//! Error types for the loading cache
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the loading cache.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Rejected configuration, reported at construction time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The loader failed while a caller was waiting for the value.
    ///
    /// Every caller that joined the same load receives the same shared error.
    #[error("Load failed: {0:#}")]
    Load(Arc<anyhow::Error>),

    /// The load task ended without producing an outcome (loader panic or runtime shutdown)
    #[error("Load aborted before producing a value")]
    LoadAborted,
}

impl CacheError {
    /// Returns the loader's original error, if this is a load failure.
    pub fn load_error(&self) -> Option<&anyhow::Error> {
        match self {
            CacheError::Load(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the loading cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_keeps_loader_message() {
        let err = CacheError::Load(Arc::new(anyhow::anyhow!("backend unavailable")));

        assert_eq!(err.to_string(), "Load failed: backend unavailable");
        assert_eq!(
            err.load_error().map(|e| e.to_string()),
            Some("backend unavailable".to_string())
        );
    }

    #[test]
    fn test_load_error_absent_for_other_variants() {
        assert!(CacheError::LoadAborted.load_error().is_none());
        assert!(CacheError::InvalidConfig("x".into()).load_error().is_none());
    }
}
