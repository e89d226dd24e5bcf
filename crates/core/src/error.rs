//! Error types for drainnet

use thiserror::Error;

/// Main error type for drainnet operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// A stage would need more working memory than the caller allows.
    #[error("{stage} needs about {required_bytes} bytes of working memory, limit is {limit_bytes}")]
    ResourceExhaustion {
        stage: &'static str,
        required_bytes: u64,
        limit_bytes: u64,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidParameter`].
    pub fn invalid_parameter(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for drainnet operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parameter_message() {
        let e = Error::invalid_parameter("window_radius", -1.0, "must be positive");
        assert_eq!(
            e.to_string(),
            "Invalid parameter: window_radius = -1 (must be positive)"
        );
    }

    #[test]
    fn test_resource_exhaustion_message() {
        let e = Error::ResourceExhaustion {
            stage: "wiener_filter",
            required_bytes: 2048,
            limit_bytes: 1024,
        };
        assert!(e.to_string().contains("wiener_filter"));
        assert!(e.to_string().contains("2048"));
    }
}
