//! Environment variable access for producer configuration overrides.
//!
//! Values are trimmed and must be non-empty. Typed lookups report unparsable
//! values instead of silently falling back to defaults.

use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when reading configuration from the environment.
#[derive(Debug, Error)]
pub enum EnvVarError {
    /// Environment variable is not set
    #[error("Environment variable '{name}' not found.")]
    NotFound { name: String },

    /// Environment variable contains invalid UTF-8 characters
    #[error("Environment variable '{name}' contains invalid UTF-8 characters.")]
    InvalidUtf8 { name: String },

    /// Environment variable is set but contains only whitespace or is empty
    #[error("Environment variable '{name}' is empty. Please provide a valid value.")]
    Empty { name: String },

    /// Environment variable is set but cannot be parsed into the expected type
    #[error("Environment variable '{name}' has an invalid value '{value}'.")]
    Invalid { name: String, value: String },
}

/// Helpers for validated environment variable access.
///
/// # Examples
///
/// ```no_run
/// use producer::utils::EnvUtils;
///
/// let retries: Option<u32> = EnvUtils::get_parsed_var("EVENTHUB_MAX_RETRIES")?;
/// # Ok::<(), producer::utils::EnvVarError>(())
/// ```
pub struct EnvUtils;

impl EnvUtils {
    /// Checks if an environment variable exists and has a non-empty value.
    pub fn has_non_empty_var(name: &str) -> bool {
        match std::env::var(name) {
            Ok(value) => !value.trim().is_empty(),
            Err(_) => false,
        }
    }

    /// Gets an environment variable, trimmed and validated as non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`EnvVarError::NotFound`], [`EnvVarError::Empty`] or
    /// [`EnvVarError::InvalidUtf8`].
    pub fn get_validated_var(name: &str) -> Result<String, EnvVarError> {
        match std::env::var(name) {
            Ok(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    Err(EnvVarError::Empty {
                        name: name.to_string(),
                    })
                } else {
                    Ok(trimmed.to_string())
                }
            }
            Err(std::env::VarError::NotPresent) => Err(EnvVarError::NotFound {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(EnvVarError::InvalidUtf8 {
                name: name.to_string(),
            }),
        }
    }

    /// Gets an optional environment variable; missing or empty values yield `None`.
    pub fn get_optional_var(name: &str) -> Option<String> {
        Self::get_validated_var(name).ok()
    }

    /// Gets an optional environment variable parsed into `T`.
    ///
    /// Missing or empty variables yield `Ok(None)`. A present value that does not
    /// parse fails with [`EnvVarError::Invalid`].
    pub fn get_parsed_var<T: FromStr>(name: &str) -> Result<Option<T>, EnvVarError> {
        match Self::get_validated_var(name) {
            Ok(value) => value
                .parse::<T>()
                .map(Some)
                .map_err(|_| EnvVarError::Invalid {
                    name: name.to_string(),
                    value,
                }),
            Err(EnvVarError::NotFound { .. }) | Err(EnvVarError::Empty { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsed_var_missing_is_none() {
        let value: Option<u32> =
            EnvUtils::get_parsed_var("HUBLINE_TEST_SURELY_UNSET_VARIABLE").unwrap();
        assert!(value.is_none());
        assert!(!EnvUtils::has_non_empty_var(
            "HUBLINE_TEST_SURELY_UNSET_VARIABLE"
        ));
    }

    #[test]
    fn test_parsed_var_invalid_value() {
        // SAFETY: variable name is unique to this test.
        unsafe { std::env::set_var("HUBLINE_TEST_INVALID_NUMBER", " twelve ") };
        let result: Result<Option<u32>, _> = EnvUtils::get_parsed_var("HUBLINE_TEST_INVALID_NUMBER");
        assert!(matches!(
            result,
            Err(EnvVarError::Invalid { ref value, .. }) if value == "twelve"
        ));
    }

    #[test]
    fn test_validated_var_trims() {
        // SAFETY: variable name is unique to this test.
        unsafe { std::env::set_var("HUBLINE_TEST_TRIMMED", "  42  ") };
        assert_eq!(EnvUtils::get_validated_var("HUBLINE_TEST_TRIMMED").unwrap(), "42");
        let parsed: Option<u64> = EnvUtils::get_parsed_var("HUBLINE_TEST_TRIMMED").unwrap();
        assert_eq!(parsed, Some(42));
    }
}
