//! Error handling for the MapOpt CLI

use mapopt_core::CoreError;
use mapopt_render::OptimizerError;
use std::path::PathBuf;
use thiserror::Error;

/// User-facing CLI errors
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid input in {file}: {message}")]
    InvalidInput { file: String, message: String },

    #[error("Invalid argument {argument}: {message}")]
    InvalidArgument { argument: String, message: String },

    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl CliError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn file_not_found(path: PathBuf) -> Self {
        Self::FileNotFound { path }
    }

    pub fn invalid_input<F: Into<String>, S: Into<String>>(file: F, message: S) -> Self {
        Self::InvalidInput {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn invalid_argument<A: Into<String>, S: Into<String>>(argument: A, message: S) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            message: message.into(),
        }
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(err: toml::ser::Error) -> Self {
        Self::config(format!("TOML serialization error: {}", err))
    }
}

/// Append hints for the errors a user can fix themselves
pub fn format_error_with_suggestions(error: &CliError) -> String {
    let mut message = error.to_string();

    match error {
        CliError::FileNotFound { path } => {
            message.push_str(&format!(
                "\n\nSuggestions:\n\
                 • Check that the file path is correct: {}\n\
                 • Ensure you have read permissions for the file",
                path.display()
            ));
        }

        CliError::InvalidInput { .. } | CliError::Core(CoreError::GeoJson(_)) => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • The input must be a GeoJSON FeatureCollection, a Feature or an array of Features\n\
                 • Ensure the file is not truncated",
            );
        }

        CliError::Core(CoreError::InvalidBounds { .. }) | CliError::Core(CoreError::BoundsFormat { .. }) => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Bounds are given as north,south,east,west in degrees, e.g. 51.6,51.4,0.1,-0.3\n\
                 • North must not be below south and east must not be west of west",
            );
        }

        CliError::Config { .. } | CliError::Optimizer(_) => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Run 'mapopt config --example' for a valid configuration\n\
                 • Level budgets and quality factors must decrease from ultra to minimal",
            );
        }

        CliError::InvalidArgument { .. } => {
            message.push_str("\n\nRun 'mapopt --help' for usage.");
        }

        CliError::Core(_) => {}
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_not_found_suggestions() {
        let err = CliError::file_not_found(PathBuf::from("missing.geojson"));
        let message = format_error_with_suggestions(&err);
        assert!(message.starts_with("File not found: missing.geojson"));
        assert!(message.contains("Suggestions"));
    }

    #[test]
    fn test_optimizer_error_is_transparent() {
        let err: CliError = OptimizerError::invalid_config("frame budget").into();
        assert_eq!(err.to_string(), "Invalid configuration: frame budget");
        assert!(format_error_with_suggestions(&err).contains("mapopt config --example"));
    }
}
