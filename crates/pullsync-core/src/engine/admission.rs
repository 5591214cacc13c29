//! Admission pool for global task concurrency
//!
//! Every child task of every folder holds one token while it does blocking
//! work, so the number of busy tasks across the whole tree never exceeds
//! the configured limit. A limit of zero disables the pool.

use crate::error::SyncError;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Process-wide pool of admission tokens
#[derive(Clone)]
pub struct AdmissionPool {
    semaphore: Option<Arc<Semaphore>>,
    limit: usize,
}

/// One unit of admission capacity, returned to the pool when dropped
#[derive(Debug)]
pub struct AdmissionToken {
    _permit: Option<OwnedSemaphorePermit>,
}

impl AdmissionPool {
    /// Create a pool with `limit` tokens (0 = unbounded)
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: (limit > 0).then(|| Arc::new(Semaphore::new(limit))),
            limit,
        }
    }

    /// Create a pool that never blocks
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Number of tokens currently handed out (always 0 when unbounded)
    pub fn in_use(&self) -> usize {
        self.semaphore
            .as_ref()
            .map(|s| self.limit - s.available_permits())
            .unwrap_or(0)
    }

    /// Wait for a token, giving up with `Cancelled` when the signal fires
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<AdmissionToken, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let Some(semaphore) = &self.semaphore else {
            return Ok(AdmissionToken { _permit: None });
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            permit = semaphore.clone().acquire_owned() => {
                // The semaphore is never closed
                let permit = permit.map_err(|_| SyncError::Cancelled)?;
                Ok(AdmissionToken { _permit: Some(permit) })
            }
        }
    }
}

impl AdmissionToken {
    /// Return the capacity to the pool
    pub fn release(self) {}
}
