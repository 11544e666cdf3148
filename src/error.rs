//! Error types for perfrnn.
//!
//! Defines all error codes and types used throughout the generator for
//! consistent error handling and reporting.

use std::fmt;

/// Error codes returned by the generator.
///
/// These codes identify the failure class so the CLI can print a
/// descriptive diagnostic before aborting the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// ONNX checkpoint files not found at expected path.
    /// Trigger: model directory missing required files.
    ModelNotFound,

    /// Failed to load an ONNX session into memory.
    /// Trigger: corrupt file, wrong format, or OOM during load.
    ModelLoadFailed,

    /// Model inference failed during generation.
    /// Trigger: shape mismatch, numerical instability, OOM.
    ModelInferenceFailed,

    /// The control argument could not be resolved.
    /// Trigger: malformed histogram, out-of-range density index,
    /// unreadable control file, or an empty control directory.
    InvalidControl,

    /// A MIDI file could not be read or mapped onto the event vocabulary.
    /// Trigger: corrupt seed file or unsupported timing format.
    InvalidMidi,

    /// Generation length could not be determined.
    /// Trigger: neither a control sequence file nor --max-len given.
    MissingLength,

    /// An output MIDI file could not be written.
    /// Trigger: unwritable output directory or disk full.
    OutputWriteFailed,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ModelNotFound => "MODEL_NOT_FOUND",
            ErrorCode::ModelLoadFailed => "MODEL_LOAD_FAILED",
            ErrorCode::ModelInferenceFailed => "MODEL_INFERENCE_FAILED",
            ErrorCode::InvalidControl => "INVALID_CONTROL",
            ErrorCode::InvalidMidi => "INVALID_MIDI",
            ErrorCode::MissingLength => "MISSING_LENGTH",
            ErrorCode::OutputWriteFailed => "OUTPUT_WRITE_FAILED",
        }
    }

    /// Returns a human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::ModelNotFound => "ONNX checkpoint files not found at expected path",
            ErrorCode::ModelLoadFailed => "Failed to load ONNX checkpoint into memory",
            ErrorCode::ModelInferenceFailed => "Model inference failed during generation",
            ErrorCode::InvalidControl => "Control argument could not be resolved",
            ErrorCode::InvalidMidi => "MIDI file could not be read or converted",
            ErrorCode::MissingLength => "Generation length could not be determined",
            ErrorCode::OutputWriteFailed => "Output MIDI file could not be written",
        }
    }

    /// Returns a recovery hint suggesting how to resolve this error.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ErrorCode::ModelNotFound => {
                "Point --model-dir at a checkpoint directory containing \
                 config.json, init.onnx and step.onnx"
            }
            ErrorCode::ModelLoadFailed => {
                "Verify the checkpoint files are not corrupted and that the \
                 export matches the config.json dimensions"
            }
            ErrorCode::ModelInferenceFailed => {
                "Try a smaller batch size or max length, or re-export the \
                 checkpoint. If the issue persists, check system memory"
            }
            ErrorCode::InvalidControl => {
                "Pass either a processed .data file, a directory of .data \
                 files, or \"<12 comma-separated weights>;<density index>\" \
                 (e.g. \"2,0,1,1,0,1,0,1,1,0,0,1;4\" or \";3\")"
            }
            ErrorCode::InvalidMidi => {
                "Check the seed MIDI file plays in other software and uses \
                 metrical (ticks-per-beat) timing"
            }
            ErrorCode::MissingLength => {
                "Pass --max-len, or pass a control sequence file so the \
                 length can be taken from it"
            }
            ErrorCode::OutputWriteFailed => {
                "Check the output directory is writable and has free space"
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for generator operations.
#[derive(Debug)]
pub struct GenError {
    /// The error code identifying the type of error.
    pub code: ErrorCode,
    /// Human-readable error message with context.
    pub message: String,
    /// Optional underlying cause of the error.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GenError {
    /// Creates a new GenError with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new GenError with an underlying cause.
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a MODEL_NOT_FOUND error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ModelNotFound,
            format!("Checkpoint files not found at: {}", path.into()),
        )
    }

    /// Creates a MODEL_LOAD_FAILED error.
    pub fn model_load_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ModelLoadFailed,
            format!("Failed to load model: {}", reason.into()),
        )
    }

    /// Creates a MODEL_INFERENCE_FAILED error.
    pub fn model_inference_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ModelInferenceFailed,
            format!("Inference failed: {}", reason.into()),
        )
    }

    /// Creates an INVALID_CONTROL error.
    pub fn invalid_control(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidControl,
            format!("Invalid control: {}", reason.into()),
        )
    }

    /// Creates an INVALID_MIDI error.
    pub fn invalid_midi(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidMidi,
            format!("Invalid MIDI: {}", reason.into()),
        )
    }

    /// Creates a MISSING_LENGTH error.
    pub fn missing_length() -> Self {
        Self::new(
            ErrorCode::MissingLength,
            "either max length or a control sequence file must be given",
        )
    }

    /// Creates an OUTPUT_WRITE_FAILED error.
    pub fn output_write_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::OutputWriteFailed,
            format!("Failed to write output: {}", reason.into()),
        )
    }
}

impl fmt::Display for GenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}. Recovery: {}",
            self.code,
            self.message,
            self.code.recovery_hint()
        )
    }
}

impl std::error::Error for GenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result type alias using GenError.
pub type Result<T> = std::result::Result<T, GenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_as_str() {
        assert_eq!(ErrorCode::ModelNotFound.as_str(), "MODEL_NOT_FOUND");
        assert_eq!(ErrorCode::ModelLoadFailed.as_str(), "MODEL_LOAD_FAILED");
        assert_eq!(
            ErrorCode::ModelInferenceFailed.as_str(),
            "MODEL_INFERENCE_FAILED"
        );
        assert_eq!(ErrorCode::InvalidControl.as_str(), "INVALID_CONTROL");
        assert_eq!(ErrorCode::InvalidMidi.as_str(), "INVALID_MIDI");
        assert_eq!(ErrorCode::MissingLength.as_str(), "MISSING_LENGTH");
        assert_eq!(ErrorCode::OutputWriteFailed.as_str(), "OUTPUT_WRITE_FAILED");
    }

    #[test]
    fn error_code_recovery_hints_not_empty() {
        // Ensure all error codes have non-empty recovery hints
        assert!(!ErrorCode::ModelNotFound.recovery_hint().is_empty());
        assert!(!ErrorCode::ModelLoadFailed.recovery_hint().is_empty());
        assert!(!ErrorCode::ModelInferenceFailed.recovery_hint().is_empty());
        assert!(!ErrorCode::InvalidControl.recovery_hint().is_empty());
        assert!(!ErrorCode::InvalidMidi.recovery_hint().is_empty());
        assert!(!ErrorCode::MissingLength.recovery_hint().is_empty());
        assert!(!ErrorCode::OutputWriteFailed.recovery_hint().is_empty());
    }

    #[test]
    fn gen_error_display() {
        let err = GenError::invalid_control("density index 99 out of range");
        assert!(err.to_string().contains("INVALID_CONTROL"));
        assert!(err.to_string().contains("99"));
        assert!(err.to_string().contains("Recovery:"));
    }

    #[test]
    fn missing_length_display() {
        let err = GenError::missing_length();
        assert!(err.to_string().contains("MISSING_LENGTH"));
    }
}
