use super::ValidationError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML config '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to parse JSON config '{path}': {source}")]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unsupported config extension '{ext}'. Use .toml or .json.")]
    UnsupportedExtension { ext: String },
    #[error("Config file must have .toml or .json extension.")]
    MissingExtension,
    #[error("Config '{field}' must be >= 1: {source}")]
    FieldMustBePositive {
        field: &'static str,
        #[source]
        source: ValidationError,
    },
    #[error("The script file '{path}' does not exist or is not readable: {source}")]
    ScriptUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid script '{path}' line {line}: {source}")]
    InvalidScript {
        path: PathBuf,
        line: usize,
        #[source]
        source: ValidationError,
    },
    #[error("The script file '{path}' has no steps.")]
    EmptyScript { path: PathBuf },
    #[error("No script given. Set --script or provide one in the config.")]
    MissingScript,
    #[error("No control stream from agent.")]
    NoControlStream,
    #[error("Expected an initialise message from agent, got '{kind}'.")]
    UnexpectedHandshake { kind: &'static str },
    #[error("Invalid control listen address '{value}'. Expected 'host:port'.")]
    InvalidListenAddress { value: String },
    #[cfg(test)]
    #[error("Test expectation failed: {message}")]
    TestExpectation { message: &'static str },
    #[cfg(test)]
    #[error("Test expectation failed: {message}: {value}")]
    TestExpectationValue {
        message: &'static str,
        value: String,
    },
}
