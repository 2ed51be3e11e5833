//! Server configuration: the JSON document, resource resolution with SHA-1
//! verification and HTTP fallback, and the ban/whitelist file.
//!
//! Configuration failures at startup are fatal by design; every error names
//! the offending option or resource in a single line.

mod access;
mod config;
mod resources;

use thiserror::Error;

pub use access::{AccessList, BanEntry};
pub use config::{
    MapEntry, MasterConfig, OptionsConfig, RandomizeMaps, ServerConfig, ServerSection,
    DEFAULT_PORT,
};
pub use resources::{
    digest_hex, fetch_resource, hash_file, validate_fetch_url, RawResource, Resource,
    ResourceStore, ResourceType,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("'{option}' must be >= {min}")]
    OptionTooSmall { option: &'static str, min: i64 },
    #[error("'{option}' must be <= {max}")]
    OptionTooLarge { option: &'static str, max: i64 },
    #[error("'{option}' must be one of {allowed}")]
    BadOptionValue {
        option: &'static str,
        allowed: &'static str,
    },
    #[error("{0}")]
    Invalid(String),
    #[error("could not find resource '{0}'")]
    MissingResource(String),
    #[error("resource '{name}' hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch {
        name: String,
        expected: String,
        computed: String,
    },
    #[error("invalid url")]
    InvalidUrl,
    #[error("error downloading '{name}': {message}")]
    FetchFailed { name: String, message: String },
}
