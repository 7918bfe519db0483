use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
    #[error("Object already exists: {0}")]
    AlreadyExists(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Failures talking to the remote encode/decode service.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("service returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("failed to parse service response: {0}")]
    Parse(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Stage of an ingest or retrieve call at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    Encode,
    Store,
    Record,
    Lookup,
    Fetch,
    Decode,
    Collect,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validate => "validate",
            Stage::Encode => "encode",
            Stage::Store => "store",
            Stage::Record => "record",
            Stage::Lookup => "lookup",
            Stage::Fetch => "fetch",
            Stage::Decode => "decode",
            Stage::Collect => "collect",
        };
        f.write_str(name)
    }
}

/// Stable, machine-readable error kind reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyInput,
    EncodingUnavailable,
    StorageWriteFailed,
    MetadataWriteFailed,
    NotFound,
    MetadataReadFailed,
    InsufficientFragments,
    DecodingFailed,
    MaintenanceFailed,
    Configuration,
}

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("refusing to ingest an empty file")]
    EmptyInput,
    #[error("encoding service unavailable: {0}")]
    EncodingUnavailable(String),
    #[error("failed to store fragment {key}: {reason}")]
    StorageWriteFailed { key: String, reason: String },
    #[error("failed to record fragment set: {0}")]
    MetadataWriteFailed(String),
    #[error("fragment set not found: {0}")]
    NotFound(String),
    #[error("failed to load fragment set {id}: {reason}")]
    MetadataReadFailed { id: String, reason: String },
    #[error("only {available} of {total} fragments retrievable, at least {required} needed")]
    InsufficientFragments {
        available: usize,
        required: usize,
        total: usize,
    },
    #[error("decoding failed: {0}")]
    DecodingFailed(String),
    #[error("orphan collection failed: {0}")]
    MaintenanceFailed(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CoordinatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordinatorError::EmptyInput => ErrorKind::EmptyInput,
            CoordinatorError::EncodingUnavailable(_) => ErrorKind::EncodingUnavailable,
            CoordinatorError::StorageWriteFailed { .. } => ErrorKind::StorageWriteFailed,
            CoordinatorError::MetadataWriteFailed(_) => ErrorKind::MetadataWriteFailed,
            CoordinatorError::NotFound(_) => ErrorKind::NotFound,
            CoordinatorError::MetadataReadFailed { .. } => ErrorKind::MetadataReadFailed,
            CoordinatorError::InsufficientFragments { .. } => ErrorKind::InsufficientFragments,
            CoordinatorError::DecodingFailed(_) => ErrorKind::DecodingFailed,
            CoordinatorError::MaintenanceFailed(_) => ErrorKind::MaintenanceFailed,
            CoordinatorError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            CoordinatorError::EmptyInput | CoordinatorError::Configuration(_) => Stage::Validate,
            CoordinatorError::EncodingUnavailable(_) => Stage::Encode,
            CoordinatorError::StorageWriteFailed { .. } => Stage::Store,
            CoordinatorError::MetadataWriteFailed(_) => Stage::Record,
            CoordinatorError::NotFound(_) | CoordinatorError::MetadataReadFailed { .. } => {
                Stage::Lookup
            }
            CoordinatorError::InsufficientFragments { .. } => Stage::Fetch,
            CoordinatorError::DecodingFailed(_) => Stage::Decode,
            CoordinatorError::MaintenanceFailed(_) => Stage::Collect,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
