//! Error types for the coordination primitives
//!
//! Store-communication failures always surface to the caller; they are never
//! folded into an allow/deny or acquired/free decision.

/// Error type for coordination primitive operations
#[derive(Debug, thiserror::Error)]
pub enum CoordError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] redis::RedisError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CoordError {
    /// Build an `InvalidArgument` error from anything displayable
    pub fn invalid(msg: impl Into<String>) -> Self {
        CoordError::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CoordError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoordError::invalid("capacity must be positive");
        assert_eq!(
            err.to_string(),
            "invalid argument: capacity must be positive"
        );
    }

    #[test]
    fn test_from_redis_error() {
        let redis_err = redis::RedisError::from((redis::ErrorKind::IoError, "connection refused"));
        let err: CoordError = redis_err.into();
        assert!(matches!(err, CoordError::StoreUnavailable(_)));
        assert!(err.to_string().starts_with("store unavailable:"));
    }
}
