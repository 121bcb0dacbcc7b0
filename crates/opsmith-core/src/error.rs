use thiserror::Error;

/// Top-level error type shared across the opsmith crates.
///
/// Each variant wraps a subsystem-specific failure. Subsystem crates define
/// their own error types and implement `From<SubsystemError> for OpsError`
/// so that the `?` operator works seamlessly across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OpsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for OpsError {
    fn from(err: toml::de::Error) -> Self {
        OpsError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for OpsError {
    fn from(err: toml::ser::Error) -> Self {
        OpsError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for OpsError {
    fn from(err: serde_json::Error) -> Self {
        OpsError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for opsmith operations.
pub type Result<T> = std::result::Result<T, OpsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OpsError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = OpsError::Storage("disk full".to_string());
        assert_eq!(err.to_string(), "Storage error: disk full");

        let err = OpsError::Serialization("invalid json".to_string());
        assert_eq!(err.to_string(), "Serialization error: invalid json");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let ops_err: OpsError = io_err.into();
        assert!(matches!(ops_err, OpsError::Io(_)));
        assert!(ops_err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let bad_toml = "invalid = [[[";
        let err: std::result::Result<toml::Value, _> = toml::from_str(bad_toml);
        assert!(err.is_err());
        let ops_err: OpsError = err.unwrap_err().into();
        assert!(matches!(ops_err, OpsError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let bad_json = "{ invalid json }";
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str(bad_json);
        assert!(err.is_err());
        let ops_err: OpsError = err.unwrap_err().into();
        assert!(matches!(ops_err, OpsError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let _value = io_result?;
            Ok("success".to_string())
        }

        assert_eq!(inner().unwrap(), "success");
    }

    #[test]
    fn test_error_debug_impl() {
        let err = OpsError::Storage("test debug".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Storage"));
        assert!(debug_str.contains("test debug"));
    }
}
