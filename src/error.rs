//! # Error Handling
//!
//! This module defines the centralized error type for the `fabric-provisioner`
//! library. It uses `thiserror` to describe every failure mode the library can
//! surface to a caller.
//!
//! ## Key Components
//!
//! - **`Error`**: The enum of all library errors. Each variant carries the
//!   context needed to act on it (file, placeholder, command, status code).
//! - **`Result<T>`**: Alias for `std::result::Result<T, Error>`.
//!
//! Most platform-side failures never become an `Error` at all: workflows turn
//! them into warnings and continue with the next workspace. The variants here
//! cover the cases that abort a run (configuration problems) and the
//! low-level failures that workflows inspect before deciding to continue.

use thiserror::Error;

/// Main error type for fabric-provisioner operations
#[derive(Error, Debug)]
pub enum Error {
    /// The environment or feature definition could not be loaded or is
    /// structurally invalid.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A name template referenced a placeholder with no value.
    #[error("Template error in '{template}': unresolved placeholder {{{variable}}}")]
    Template { template: String, variable: String },

    /// The CLI could not be started or returned output that could not be
    /// interpreted.
    #[error("Transport error running '{command}': {message}")]
    Transport { command: String, message: String },

    /// A REST call returned a status code the caller cannot work with.
    #[error("API call {method} {path} returned status {status}")]
    Api {
        method: String,
        path: String,
        status: u16,
    },

    /// A referenced workspace, item or connection does not exist.
    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    /// An asynchronous resource did not reach a usable state within its
    /// retry budget.
    #[error("{resource} not ready: {message}")]
    NotReady { resource: String, message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML error, wrapped from `serde_yaml::Error`.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    /// Shorthand for a configuration error without a hint.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            hint: None,
        }
    }

    /// Shorthand for a configuration error with a hint.
    pub fn config_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config() {
        let error = Error::config("base definition missing");
        let display = format!("{}", error);
        assert!(display.contains("Configuration error"));
        assert!(display.contains("base definition missing"));
        assert!(!display.contains("hint:"));
    }

    #[test]
    fn test_error_display_config_with_hint() {
        let error = Error::config_with_hint("missing 'name'", "Add a solution name template");
        let display = format!("{}", error);
        assert!(display.contains("missing 'name'"));
        assert!(display.contains("hint:"));
        assert!(display.contains("Add a solution name template"));
    }

    #[test]
    fn test_error_display_template() {
        let error = Error::Template {
            template: "{solution} - {layer}".to_string(),
            variable: "solution".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("{solution} - {layer}"));
        assert!(display.contains("unresolved placeholder {solution}"));
    }

    #[test]
    fn test_error_display_transport() {
        let error = Error::Transport {
            command: "exists Sales.Workspace".to_string(),
            message: "No such file or directory".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("Transport error"));
        assert!(display.contains("exists Sales.Workspace"));
    }

    #[test]
    fn test_error_display_api() {
        let error = Error::Api {
            method: "post".to_string(),
            path: "workspaces/1/git/connect".to_string(),
            status: 409,
        };
        let display = format!("{}", error);
        assert!(display.contains("post workspaces/1/git/connect"));
        assert!(display.contains("409"));
    }

    #[test]
    fn test_error_display_not_found() {
        let error = Error::NotFound {
            kind: "Workspace".to_string(),
            name: "Sales - Store [dev]".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Workspace not found: Sales - Store [dev]"
        );
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let error: Error = io_error.into();
        let display = format!("{}", error);
        assert!(display.contains("I/O error"));
        assert!(display.contains("File not found"));
    }

    #[test]
    fn test_error_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{ invalid").unwrap_err();
        let error: Error = json_error.into();
        assert!(format!("{}", error).contains("JSON error"));
    }

    #[test]
    fn test_error_from_yaml_error() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: [unclosed").unwrap_err();
        let error: Error = yaml_error.into();
        assert!(format!("{}", error).contains("YAML error"));
    }
}
