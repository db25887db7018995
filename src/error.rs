//! Typed error conditions for the production pipeline.
//!
//! Most operations in this crate return [`anyhow::Result`] with context attached at
//! each filesystem boundary. The variants here are the root causes callers branch on:
//! a timeout is reported differently from a collaborator crash, and a configuration
//! error must stop the run before any file is touched.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The pipeline step a failure happened in. Used for logging and failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    FamilyPass,
    Extract,
    Store,
    Rasterize,
    Stamp,
    Serialize,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FamilyPass => "family_pass",
            Self::Extract => "extract",
            Self::Store => "store",
            Self::Rasterize => "rasterize",
            Self::Stamp => "stamp",
            Self::Serialize => "serialize",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ProductionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input directory not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("{phase} failed for {file}: {message}")]
    Collaborator {
        phase: Phase,
        file: String,
        message: String,
    },

    #[error("{phase} timed out for {file} after {after:?}")]
    Timeout {
        phase: Phase,
        file: String,
        after: Duration,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Character {ch:?} cannot be encoded as {encoding}")]
    Encoding { ch: char, encoding: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProductionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
