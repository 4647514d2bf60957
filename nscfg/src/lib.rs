//! Keeps the name-service configuration store and the legacy flat files
//! (`resolv.conf`, `nsswitch.conf`, `nscd.conf`, the LDAP client files and
//! the NIS domain files) in sync.

use std::path::PathBuf;

use miette::Diagnostic;
use strum::Display;
use thiserror::Error;

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod legacy;
pub mod messages;
pub mod schema;
pub mod services;
pub mod store;

use schema::ParseError;
use store::StoreError;

#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    #[error("{} invalid value(s) in {}", .errors.len(), .path.display())]
    #[diagnostic(code(nscfg::validation))]
    Validation {
        path: PathBuf,
        errors: Vec<ParseError>,
    },

    #[error("invalid value for {group}/{name}: {reason}")]
    #[diagnostic(code(nscfg::invalid_property))]
    InvalidProperty {
        group: String,
        name: String,
        reason: String,
    },

    #[error(transparent)]
    #[diagnostic(code(nscfg::store))]
    Store(#[from] StoreError),

    #[error("{}: {source}", path.display())]
    #[diagnostic(code(nscfg::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("inconsistent schema: {0}")]
    #[diagnostic(code(nscfg::schema))]
    Schema(String),

    #[error(transparent)]
    #[diagnostic(code(nscfg::config))]
    Config(#[from] ::config::ConfigError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Result of an operation that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    /// Valid, but nothing needed to change.
    NoChange,
    /// The legacy file does not exist.
    NoConfig,
}
