//! Remote store capability
//!
//! The engine only needs to list folders, resolve a transient download
//! URL for a file and delete nodes. Implementations must be safe to call
//! from many tasks at once.

use async_trait::async_trait;
use pullsync_types::{RemoteEntry, RemoteId};
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("remote item {0} not found")]
    NotFound(RemoteId),
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Request(_) | RemoteError::NotFound(_) => true,
            RemoteError::Api { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            RemoteError::Url(_) => false,
        }
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List the store root, returning the root entry itself and its children
    async fn list_root(&self) -> Result<(RemoteEntry, Vec<RemoteEntry>), RemoteError>;

    /// List the children of a folder, in store order
    async fn list(&self, folder_id: RemoteId) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Resolve a short-lived URL the file's content can be fetched from
    async fn download_url(&self, file_id: RemoteId) -> Result<Url, RemoteError>;

    /// Delete a file or folder
    async fn delete(&self, id: RemoteId) -> Result<(), RemoteError>;
}
