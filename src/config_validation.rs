//! Configuration validation.
//!
//! Every problem is collected before reporting, so a run with several missing
//! variables fails once with all of them listed instead of one at a time.

use thiserror::Error;

/// Validation error with context about which field failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Field '{field}' is required but not provided")]
    RequiredField { field: String },

    #[error("Field '{field}': value {value} is out of range ({min} to {max})")]
    OutOfRange {
        field: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Field '{field}': invalid format - {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Multiple validation errors: {0}")]
    Multiple(String),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Collects validation errors.
#[derive(Debug, Default)]
pub struct ValidationContext {
    errors: Vec<ValidationError>,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Returns the value if present, otherwise records a missing-field error.
    pub fn require<T>(&mut self, value: Option<T>, field: &str) -> Option<T> {
        if value.is_none() {
            self.add_error(ValidationError::RequiredField {
                field: field.to_string(),
            });
        }
        value
    }

    /// Records the error of a failed check, keeping the successful value.
    pub fn check<T>(&mut self, result: ValidationResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.add_error(e);
                None
            }
        }
    }

    /// Consume the context and return a result.
    ///
    /// A single error is returned as-is; several are folded into `Multiple`.
    pub fn into_result(mut self) -> ValidationResult<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => {
                let messages: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
                Err(ValidationError::Multiple(messages.join("; ")))
            }
        }
    }
}

/// Validator for numeric ranges.
pub struct RangeValidator;

impl RangeValidator {
    pub fn validate_u64(value: u64, min: u64, max: u64, field: &str) -> ValidationResult<()> {
        if value < min || value > max {
            return Err(ValidationError::OutOfRange {
                field: field.to_string(),
                value: value.to_string(),
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        Ok(())
    }
}

/// Validator for durations.
pub struct DurationValidator;

impl DurationValidator {
    /// Parses a duration string and rejects zero.
    pub fn parse_positive(
        duration_str: &str,
        field: &str,
    ) -> ValidationResult<std::time::Duration> {
        let duration = crate::utils::parse_duration_string(duration_str).map_err(|e| {
            ValidationError::InvalidFormat {
                field: field.to_string(),
                message: format!("Invalid duration format '{}': {}", duration_str, e),
            }
        })?;

        if duration.is_zero() {
            return Err(ValidationError::OutOfRange {
                field: field.to_string(),
                value: duration_str.to_string(),
                min: "1ms".to_string(),
                max: "unlimited".to_string(),
            });
        }

        Ok(duration)
    }
}
