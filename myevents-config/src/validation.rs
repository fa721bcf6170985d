// Configuration validation

use crate::{ConfigError, Result};

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Reusable validation rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        Ok(())
    }

    /// Validate that a value is in a list of allowed values
    pub fn one_of(value: &str, allowed: &[&str], field: &str) -> Result<()> {
        if !allowed.contains(&value) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be one of {:?}, got {:?}",
                field, allowed, value
            )));
        }
        Ok(())
    }

    /// Validate that a number is greater than zero
    pub fn positive(value: u64, field: &str) -> Result<()> {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{} must be greater than zero",
                field
            )));
        }
        Ok(())
    }

    /// Validate that a URL uses one of the given schemes
    pub fn has_scheme(value: &str, schemes: &[&str], field: &str) -> Result<()> {
        let ok = schemes
            .iter()
            .any(|scheme| value.starts_with(&format!("{}://", scheme)));
        if !ok {
            return Err(ConfigError::ValidationError(format!(
                "{} must start with one of {:?}",
                field, schemes
            )));
        }
        Ok(())
    }
}
