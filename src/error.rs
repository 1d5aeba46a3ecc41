//! Error types for the archipelago simulator.
//!
//! All fallible setup and I/O paths return [`SimulationError`]. The tick
//! pipeline itself never returns errors: stage-level trouble (an infeasible
//! trade line, a failed agent action) is data carried in the tick metrics,
//! and a broken world invariant is a bug that panics with the offending
//! entity and tick.

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Custom error type for the simulator.
///
/// Covers configuration loading and validation, world initialization, and
/// output / replay-log serialization.
#[derive(Debug)]
pub enum SimulationError {
    /// Error occurred while reading a configuration file
    ConfigFileRead(io::Error),

    /// Error occurred while parsing YAML configuration
    YamlParse(String),

    /// Error occurred while parsing TOML configuration
    TomlParse(String),

    /// Configuration file has an unsupported extension
    UnsupportedConfigFormat(String),

    /// Configuration validation failed
    ValidationError(String),

    /// The initial world could not be built from the configuration
    WorldInit(String),

    /// Error occurred while writing output files
    IoError(io::Error),

    /// Error occurred while serializing JSON output
    JsonSerialize(String),

    /// Error occurred while writing the replay log
    ReplayLogWrite(io::Error),

    /// Error occurred while reading the replay log
    ReplayLogRead(io::Error),

    /// Error occurred while serializing the replay log
    ReplayLogSerialize(serde_json::Error),

    /// Error occurred while deserializing the replay log
    ReplayLogDeserialize(serde_json::Error),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::ConfigFileRead(e) => {
                write!(f, "Failed to read configuration file: {}", e)
            }
            SimulationError::YamlParse(msg) => {
                write!(f, "Failed to parse YAML configuration: {}", msg)
            }
            SimulationError::TomlParse(msg) => {
                write!(f, "Failed to parse TOML configuration: {}", msg)
            }
            SimulationError::UnsupportedConfigFormat(ext) => {
                write!(
                    f,
                    "Unsupported configuration file format: '{}'. Use .yaml, .yml, or .toml",
                    ext
                )
            }
            SimulationError::ValidationError(msg) => {
                write!(f, "Configuration validation failed: {}", msg)
            }
            SimulationError::WorldInit(msg) => {
                write!(f, "World initialization failed: {}", msg)
            }
            SimulationError::IoError(e) => {
                write!(f, "I/O error: {}", e)
            }
            SimulationError::JsonSerialize(msg) => {
                write!(f, "Failed to serialize JSON: {}", msg)
            }
            SimulationError::ReplayLogWrite(e) => {
                write!(f, "Failed to write replay log: {}", e)
            }
            SimulationError::ReplayLogRead(e) => {
                write!(f, "Failed to read replay log: {}", e)
            }
            SimulationError::ReplayLogSerialize(e) => {
                write!(f, "Failed to serialize replay log: {}", e)
            }
            SimulationError::ReplayLogDeserialize(e) => {
                write!(f, "Failed to deserialize replay log: {}", e)
            }
        }
    }
}

impl StdError for SimulationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SimulationError::ConfigFileRead(e)
            | SimulationError::IoError(e)
            | SimulationError::ReplayLogWrite(e)
            | SimulationError::ReplayLogRead(e) => Some(e),
            SimulationError::ReplayLogSerialize(e) | SimulationError::ReplayLogDeserialize(e) => {
                Some(e)
            }
            _ => None,
        }
    }
}

impl From<io::Error> for SimulationError {
    fn from(err: io::Error) -> Self {
        SimulationError::IoError(err)
    }
}

/// Type alias for Result with SimulationError
pub type Result<T> = std::result::Result<T, SimulationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_validation_error() {
        let err = SimulationError::ValidationError("seed must be set".to_string());
        assert!(err.to_string().contains("seed must be set"));
    }

    #[test]
    fn test_display_unsupported_format() {
        let err = SimulationError::UnsupportedConfigFormat("ini".to_string());
        assert!(err.to_string().contains("'ini'"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: SimulationError = io_err.into();
        assert!(matches!(err, SimulationError::IoError(_)));
    }

    #[test]
    fn test_source_chain() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = SimulationError::ConfigFileRead(io_err);
        assert!(err.source().is_some());
    }
}
