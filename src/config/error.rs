//! Configuration Error Types
//!
//! Errors raised while layering, deserializing and validating fleet
//! configuration.

use std::path::PathBuf;
use thiserror::Error;

use crate::error::HaulError;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Configuration directory does not exist
    #[error("Configuration directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// Source layering or deserialization failed
    #[error("Failed to load configuration for environment '{environment}': {error}")]
    LoadError { environment: String, error: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// Fleet definition could not be read or parsed
    #[error("Failed to read fleet definition '{file_path}': {error}")]
    FleetDefinitionError { file_path: String, error: String },
}

impl ConfigurationError {
    pub fn load_error<E: Into<String>, R: std::fmt::Display>(environment: E, error: R) -> Self {
        Self::LoadError {
            environment: environment.into(),
            error: error.to_string(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value<F: Into<String>, V: ToString, C: Into<String>>(
        field: F,
        value: V,
        context: C,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            context: context.into(),
        }
    }

    pub fn fleet_definition<P: Into<String>, E: std::fmt::Display>(file_path: P, error: E) -> Self {
        Self::FleetDefinitionError {
            file_path: file_path.into(),
            error: error.to_string(),
        }
    }
}

impl From<ConfigurationError> for HaulError {
    fn from(error: ConfigurationError) -> Self {
        HaulError::Configuration(error.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
