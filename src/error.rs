//! Error types for LDraw loading
//!
//! This module provides error handling for loading LDraw documents and the
//! parts libraries they reference. All errors include error codes for
//! categorization and enough context to locate the failing file.
//!
//! Fatal errors abort a load; recoverable per-line problems (bad geometry
//! lines, contradictory meta commands, missing sub-models) are reported
//! through the [`Alert`](crate::alert::Alert) channel instead and leave the
//! load running.
//!
//! # Error Codes
//!
//! Error codes follow the pattern: `E<category><number>`
//!
//! Categories:
//! - **E1xxx**: I/O and archive errors
//! - **E2xxx**: LDraw format errors
//! - **E3xxx**: Reference resolution errors
//! - **E4xxx**: Unsupported features
//!
//! ## Common Error Codes
//!
//! - `E1001`: I/O error reading file
//! - `E1002`: ZIP archive format error
//! - `E1003`: Missing entry in archive or search path
//! - `E2001`: Numeric parse error
//! - `E2002`: Invalid LDraw format
//! - `E3001`: Referenced sub-model not found
//! - `E3002`: Model references itself
//! - `E3003`: Invalid search directory configuration
//! - `E3004`: Load canceled
//! - `E4001`: Unsupported feature

use std::io;
use thiserror::Error;

/// Result type for LDraw operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when loading LDraw files
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred while reading a file
    ///
    /// **Error Code**: E1001
    ///
    /// **Common Causes**:
    /// - File not found
    /// - Insufficient permissions
    /// - Disk read error
    #[error("[E1001] I/O error: {0}")]
    Io(#[from] io::Error),

    /// ZIP archive error
    ///
    /// **Error Code**: E1002
    ///
    /// **Common Causes**:
    /// - Corrupted parts-library archive
    /// - Unsupported compression method
    /// - Truncated archive
    ///
    /// **Suggestions**:
    /// - Verify the archive is a valid ZIP file (e.g. complete.zip from ldraw.org)
    /// - Try re-downloading the parts library
    #[error("[E1002] ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Missing entry in an archive or on the search path
    ///
    /// **Error Code**: E1003
    ///
    /// **Common Causes**:
    /// - Incomplete parts library
    /// - Misspelled file name in a type 1 line
    #[error("[E1003] Missing entry: {0}")]
    MissingEntry(String),

    /// Parse error for numeric values
    ///
    /// **Error Code**: E2001
    ///
    /// **Common Causes**:
    /// - Invalid number format
    /// - Non-numeric characters in coordinate fields
    ///
    /// **Suggestions**:
    /// - Verify numeric values use proper format (e.g. "1.5" not "1,5")
    /// - Check for stray characters or missing fields
    #[error("[E2001] Parse error: {0}")]
    ParseError(String),

    /// Invalid LDraw format
    ///
    /// **Error Code**: E2002
    ///
    /// **Common Causes**:
    /// - Truncated geometry line
    /// - Meta command with malformed arguments
    /// - Embedded data block that is not valid base64
    #[error("[E2002] Invalid LDraw format: {0}")]
    InvalidFormat(String),

    /// Referenced sub-model not found
    ///
    /// **Error Code**: E3001
    ///
    /// **Common Causes**:
    /// - Part missing from the installed library
    /// - Unofficial part referenced while unofficial parts are disabled
    ///
    /// **Suggestions**:
    /// - Update the parts library
    /// - Check the search directory configuration
    #[error("[E3001] Sub-model not found: {0}")]
    SubModelNotFound(String),

    /// Model references itself through the search path
    ///
    /// **Error Code**: E3002
    #[error("[E3002] Model references itself: {0}")]
    SelfReference(String),

    /// Invalid search directory configuration
    ///
    /// **Error Code**: E3003
    ///
    /// **Common Causes**:
    /// - Malformed entry in the search configuration file
    /// - `<LDRAWDIR>` placeholder used without a library path
    #[error("[E3003] Invalid search configuration: {0}")]
    BadSearchConfig(String),

    /// The load was canceled through the cancel handle
    ///
    /// **Error Code**: E3004
    #[error("[E3004] Load canceled")]
    LoadCanceled,

    /// Unsupported feature
    ///
    /// **Error Code**: E4001
    ///
    /// **Common Causes**:
    /// - Meta command from a tool this loader does not implement
    /// - Future LDraw specification features
    #[error("[E4001] Unsupported feature: {0}")]
    Unsupported(String),
}

impl From<std::num::ParseFloatError> for Error {
    fn from(err: std::num::ParseFloatError) -> Self {
        Error::ParseError(format!("Failed to parse floating-point number: {}", err))
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Error::ParseError(format!("Failed to parse integer: {}", err))
    }
}

impl Error {
    /// Create a ParseError with context about what was being parsed
    ///
    /// # Arguments
    /// * `field_name` - The name of the field being parsed (e.g. "matrix column 2")
    /// * `value` - The value that failed to parse
    /// * `expected_type` - The expected type (e.g. "floating-point number")
    pub fn parse_error_with_context(field_name: &str, value: &str, expected_type: &str) -> Self {
        Error::ParseError(format!(
            "Failed to parse '{}': expected {}, got '{}'. \
             Verify the value is properly formatted.",
            field_name, expected_type, value
        ))
    }

    /// Create an InvalidFormat error with context about what structure is invalid
    ///
    /// # Arguments
    /// * `context` - What part of the format is invalid (e.g. "TEXMAP command", "line type 3")
    /// * `message` - Description of the error
    pub fn invalid_format_context(context: &str, message: &str) -> Self {
        Error::InvalidFormat(format!("{}: {}", context, message))
    }

    /// Create a MissingEntry error for a file name that resolved nowhere
    ///
    /// # Arguments
    /// * `name` - The LDraw file name as written in the referencing line
    pub fn missing_entry(name: &str) -> Self {
        Error::MissingEntry(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_in_messages() {
        // Verify error codes are present in error messages
        let io_err = Error::Io(io::Error::new(io::ErrorKind::NotFound, "test"));
        assert!(io_err.to_string().contains("[E1001]"));

        let missing = Error::MissingEntry("3001.dat".to_string());
        assert!(missing.to_string().contains("[E1003]"));

        let parse_err = Error::ParseError("test".to_string());
        assert!(parse_err.to_string().contains("[E2001]"));

        let not_found = Error::SubModelNotFound("wheel.ldr".to_string());
        assert!(not_found.to_string().contains("[E3001]"));

        let canceled = Error::LoadCanceled;
        assert!(canceled.to_string().contains("[E3004]"));

        let unsupported = Error::Unsupported("test feature".to_string());
        assert!(unsupported.to_string().contains("[E4001]"));
    }

    #[test]
    fn test_parse_error_with_context_helper() {
        let err = Error::parse_error_with_context("matrix column 2", "abc", "floating-point number");
        assert!(err.to_string().contains("matrix column 2"));
        assert!(err.to_string().contains("floating-point number"));
        assert!(err.to_string().contains("'abc'"));
        assert!(err.to_string().contains("properly formatted"));
        assert!(err.to_string().contains("[E2001]"));
    }

    #[test]
    fn test_invalid_format_context_helper() {
        let err = Error::invalid_format_context("TEXMAP command", "unknown projection 'CONICAL'");
        assert!(err.to_string().contains("TEXMAP command"));
        assert!(err.to_string().contains("CONICAL"));
        assert!(err.to_string().contains("[E2002]"));
    }

    #[test]
    fn test_missing_entry_helper() {
        let err = Error::missing_entry("s\\3001s01.dat");
        assert!(err.to_string().contains("s\\3001s01.dat"));
        assert!(err.to_string().contains("[E1003]"));
    }

    #[test]
    fn test_parse_float_error_conversion() {
        let parse_err: std::num::ParseFloatError = "not_a_number".parse::<f32>().unwrap_err();
        let err = Error::from(parse_err);
        assert!(err
            .to_string()
            .contains("Failed to parse floating-point number"));
        assert!(err.to_string().contains("[E2001]"));
    }

    #[test]
    fn test_parse_int_error_conversion() {
        let parse_err: std::num::ParseIntError = "not_a_number".parse::<i32>().unwrap_err();
        let err = Error::from(parse_err);
        assert!(err.to_string().contains("Failed to parse integer"));
        assert!(err.to_string().contains("[E2001]"));
    }
}
