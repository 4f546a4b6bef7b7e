//! Engine module containing the download drivers, builder pattern, and
//! configuration.
//!
//! This module provides the main [`DownloadEngine`] struct and its builder.
//! The engine owns the shared HTTP client, the interrupt token, and the
//! engine-level configuration; payloads are handed to it one at a time
//! ([`DownloadEngine::download`]) or as a batch
//! ([`DownloadEngine::download_all`]).
//!
//! # Overview
//!
//! The engine module is organized into these components:
//!
//! - `builder` - [`EngineBuilder`] for flexible configuration
//! - `config` - configuration structures and callback types
//! - `client` - shared HTTP client construction
//! - `session` - one transport attempt against one mirror
//! - `single` - the single-transfer driver and post-transfer decision tree
//! - `multi` - the parallel multi-transfer driver with mirror failover
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::path::Path;
//! use pacfetch::{EngineBuilder, Payload};
//!
//! # async fn example() -> pacfetch::Result<()> {
//! let engine = EngineBuilder::new().parallel_downloads(4).build()?;
//!
//! let mut payloads = vec![
//!     Payload::new(
//!         vec!["https://mirror-a.example.org/core".into()],
//!         "foo-1-1.pkg.tar.zst",
//!     )
//!     .with_resume(true),
//! ];
//! engine
//!     .download_all(&mut payloads, Path::new("/var/cache/pkg"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;

mod client;
mod multi;
mod session;
mod single;

pub use builder::EngineBuilder;
pub use config::{FetchCallback, SigPolicy};

use reqwest_middleware::ClientWithMiddleware;

use crate::error::Result;
use crate::events::{self, DownloadEvent};
use crate::interrupt::Interrupt;
use crate::payload::Payload;
use config::EngineConfig;

/// How a successful transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Fresh bytes were downloaded and published.
    Downloaded,
    /// The local file already matched the server's copy.
    UpToDate,
}

impl TransferStatus {
    /// The numeric result carried by completion events: `0` downloaded,
    /// `1` up to date.
    pub fn code(self) -> i32 {
        match self {
            TransferStatus::Downloaded => 0,
            TransferStatus::UpToDate => 1,
        }
    }
}

/// Summary of one successful single-payload transfer.
#[derive(Debug, Clone)]
pub struct Transfer {
    /// Whether bytes were downloaded or the local copy was current.
    pub status: TransferStatus,
    /// Basename of the published file, when one was published.
    pub final_file: Option<String>,
    /// The URL the bytes actually came from, after redirects.
    pub effective_url: Option<String>,
    /// Bytes downloaded by the final attempt.
    pub bytes_downloaded: u64,
}

/// The download engine: one shared transport, one interrupt token, and the
/// drivers that move payloads through it.
///
/// Created via [`EngineBuilder`]. The engine is cheap to share by
/// reference; each driver call exclusively borrows the payloads it works
/// on.
pub struct DownloadEngine {
    pub(crate) config: EngineConfig,
    pub(crate) client: ClientWithMiddleware,
    pub(crate) interrupt: Interrupt,
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("config", &self.config)
            .finish()
    }
}

impl DownloadEngine {
    pub(crate) fn new(config: EngineConfig, interrupt: Interrupt) -> Result<Self> {
        let client = client::build_client(&config).map_err(crate::error::Error::from)?;
        Ok(Self {
            config,
            client,
            interrupt,
        })
    }

    /// The engine's interrupt token. Cancelling it tears down every
    /// transfer this engine is running.
    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// The configured signature policy.
    pub fn sig_policy(&self) -> SigPolicy {
        self.config.sig_policy
    }

    pub(crate) fn emit_init(&self, payload: &Payload) {
        if !payload.signature {
            events::emit(
                self.config.events.as_ref(),
                payload.remote_name(),
                DownloadEvent::Init {
                    optional: payload.errors_ok,
                },
            );
        }
    }

    pub(crate) fn emit_completed(&self, payload: &Payload, total: u64, result: i32) {
        if !payload.signature {
            events::emit(
                self.config.events.as_ref(),
                payload.remote_name(),
                DownloadEvent::Completed { total, result },
            );
        }
    }
}
