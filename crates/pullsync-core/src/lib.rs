//! pullsync Core - pull-and-delete sync engine
//!
//! This crate mirrors folders of a remote file store onto the local disk
//! and deletes every remote item once its local copy is verified. Empty
//! remote folders are pruned bottom-up; configured top-level folders are
//! kept.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use pullsync_core::{config, engine::Syncer, putio::PutioClient};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let settings = config::load(&config::default_config_path()?).await?;
//! let store = Arc::new(PutioClient::new(settings.token.clone())?);
//! let syncer = Syncer::from_settings(store, &settings)?;
//! let report = syncer.scan(&CancellationToken::new()).await?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
mod error;
pub mod putio;
pub mod remote;
pub mod scheduler;

pub use error::*;
