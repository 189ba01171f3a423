//! PCTR-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, PctrError>;

/// Top-level error type for the people counter daemon.
#[derive(Debug, Error)]
pub enum PctrError {
    #[error("[PCTR-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[PCTR-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[PCTR-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[PCTR-2001] store schema mismatch: {details}")]
    SchemaMismatch { details: String },

    #[error("[PCTR-2002] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[PCTR-2003] store write exhausted retries for {what}: {details}")]
    StoreWriteExhausted { what: &'static str, details: String },

    #[error("[PCTR-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[PCTR-3001] export failed for {path}: {details}")]
    Export { path: PathBuf, details: String },

    #[error("[PCTR-3002] export destination locked: {path}")]
    ExportLocked { path: PathBuf },

    #[error("[PCTR-4001] SMTP dispatch failed: {details}")]
    Smtp { details: String },

    #[error("[PCTR-4002] unknown timezone: {tz}")]
    UnknownTimezone { tz: String },

    #[error("[PCTR-5001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[PCTR-5002] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[PCTR-5900] runtime failure: {details}")]
    Runtime { details: String },
}

impl PctrError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "PCTR-1001",
            Self::MissingConfig { .. } => "PCTR-1002",
            Self::ConfigParse { .. } => "PCTR-1003",
            Self::SchemaMismatch { .. } => "PCTR-2001",
            Self::Sql { .. } => "PCTR-2002",
            Self::StoreWriteExhausted { .. } => "PCTR-2003",
            Self::Serialization { .. } => "PCTR-2101",
            Self::Export { .. } => "PCTR-3001",
            Self::ExportLocked { .. } => "PCTR-3002",
            Self::Smtp { .. } => "PCTR-4001",
            Self::UnknownTimezone { .. } => "PCTR-4002",
            Self::Io { .. } => "PCTR-5001",
            Self::ChannelClosed { .. } => "PCTR-5002",
            Self::Runtime { .. } => "PCTR-5900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::ChannelClosed { .. }
                | Self::Sql { .. }
                | Self::Smtp { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<rusqlite::Error> for PctrError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for PctrError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for PctrError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<lettre::transport::smtp::Error> for PctrError {
    fn from(value: lettre::transport::smtp::Error) -> Self {
        Self::Smtp {
            details: value.to_string(),
        }
    }
}

impl From<lettre::error::Error> for PctrError {
    fn from(value: lettre::error::Error) -> Self {
        Self::Smtp {
            details: value.to_string(),
        }
    }
}
