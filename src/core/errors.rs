//! PVTD-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cluster::types::TargetKind;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, PvtdError>;

/// Top-level error type for pv_teardown.
#[derive(Debug, Error)]
pub enum PvtdError {
    #[error("[PVTD-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[PVTD-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[PVTD-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[PVTD-2001] cluster API failure during {operation}: {details}")]
    ClusterApi {
        operation: &'static str,
        details: String,
    },

    #[error("[PVTD-2002] {kind} {} not found", qualified_name(.name, .namespace.as_deref()))]
    NotFound {
        kind: TargetKind,
        name: String,
        namespace: Option<String>,
    },

    #[error("[PVTD-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[PVTD-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[PVTD-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl PvtdError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "PVTD-1001",
            Self::MissingConfig { .. } => "PVTD-1002",
            Self::ConfigParse { .. } => "PVTD-1003",
            Self::ClusterApi { .. } => "PVTD-2001",
            Self::NotFound { .. } => "PVTD-2002",
            Self::Serialization { .. } => "PVTD-2101",
            Self::Io { .. } => "PVTD-3002",
            Self::Runtime { .. } => "PVTD-3900",
        }
    }

    /// The object the call addressed does not exist.
    ///
    /// Deletes and existence reads treat this as terminal success.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for a missing cluster object.
    #[must_use]
    pub fn not_found(kind: TargetKind, name: &str, namespace: Option<&str>) -> Self {
        Self::NotFound {
            kind,
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
        }
    }
}

fn qualified_name(name: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) => format!("{ns}/{name}"),
        None => name.to_string(),
    }
}

impl From<serde_json::Error> for PvtdError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for PvtdError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
