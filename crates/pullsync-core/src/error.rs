//! Error types for pullsync core

use crate::remote::RemoteError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while syncing a remote tree
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Listing remote folder '{name}' failed: {source}")]
    Listing {
        name: String,
        #[source]
        source: RemoteError,
    },

    #[error("Target local path '{}' is not a directory", .0.display())]
    DirectoryConflict(PathBuf),

    #[error("Error making local directory '{}': {source}", .path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Generating download URL for '{name}' failed: {source}")]
    UrlResolution {
        name: String,
        #[source]
        source: RemoteError,
    },

    #[error("Downloading '{name}' failed: {reason}")]
    Transport { name: String, reason: String },

    #[error("Checksum mismatch for '{name}': expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },

    #[error("Deleting remote '{name}' failed: {source}")]
    RemoteDeletion {
        name: String,
        #[source]
        source: RemoteError,
    },

    #[error("Sync was cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Kind tag for a [`SyncError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Listing,
    DirectoryConflict,
    CreateDirectory,
    UrlResolution,
    Transport,
    ChecksumMismatch,
    RemoteDeletion,
    Cancelled,
    Io,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Listing { .. } => ErrorKind::Listing,
            SyncError::DirectoryConflict(_) => ErrorKind::DirectoryConflict,
            SyncError::CreateDirectory { .. } => ErrorKind::CreateDirectory,
            SyncError::UrlResolution { .. } => ErrorKind::UrlResolution,
            SyncError::Transport { .. } => ErrorKind::Transport,
            SyncError::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            SyncError::RemoteDeletion { .. } => ErrorKind::RemoteDeletion,
            SyncError::Cancelled => ErrorKind::Cancelled,
            SyncError::Io(_) => ErrorKind::Io,
        }
    }

    /// Cancellation is not a failure and is never logged as one
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Check if the next scan pass may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Listing { source, .. }
            | SyncError::UrlResolution { source, .. }
            | SyncError::RemoteDeletion { source, .. } => source.is_retryable(),
            SyncError::Transport { .. } | SyncError::ChecksumMismatch { .. } => true,
            SyncError::Cancelled => true,
            SyncError::DirectoryConflict(_)
            | SyncError::CreateDirectory { .. }
            | SyncError::Io(_) => false,
        }
    }
}
