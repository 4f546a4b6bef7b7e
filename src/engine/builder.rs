//! Builder for [`DownloadEngine`] instances.
//!
//! # Examples
//!
//! ```rust
//! use pacfetch::{EngineBuilder, SigPolicy};
//!
//! # fn main() -> pacfetch::Result<()> {
//! let engine = EngineBuilder::new()
//!     .parallel_downloads(4)
//!     .sig_policy(SigPolicy::Optional)
//!     .on_event(|name, event| println!("{name}: {event:?}"))
//!     .build()?;
//! # let _ = engine;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use super::config::{EngineConfig, FetchCallback, SigPolicy};
use super::DownloadEngine;
use crate::error::Result;
use crate::events::DownloadEvent;
use crate::interrupt::Interrupt;
use super::TransferStatus;

/// A builder used to create a [`DownloadEngine`].
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    interrupt: Option<Interrupt>,
}

impl EngineBuilder {
    /// Creates a builder with the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many transfers the multi driver runs in parallel.
    /// Values below 1 are treated as 1.
    pub fn parallel_downloads(mut self, parallel_downloads: usize) -> Self {
        self.config.parallel_downloads = parallel_downloads;
        self
    }

    /// Disables the stalled-transfer timeout.
    pub fn disable_download_timeout(mut self, disable: bool) -> Self {
        self.config.disable_download_timeout = disable;
        self
    }

    /// Sets the detached-signature policy for package-URL fetches.
    pub fn sig_policy(mut self, sig_policy: SigPolicy) -> Self {
        self.config.sig_policy = sig_policy;
        self
    }

    /// Overrides the transport User-Agent. Without this the
    /// `HTTP_USER_AGENT` environment variable is honored when set.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Installs the lifecycle event callback.
    ///
    /// The callback receives the payload's remote name and the event; it is
    /// never invoked for signature payloads.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &DownloadEvent) + Send + Sync + 'static,
    {
        self.config.events = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Installs an external fetch callback. When set, both drivers bypass
    /// the built-in transport and delegate every transfer to the callback.
    pub fn fetch_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &Path, bool) -> Option<TransferStatus> + Send + Sync + 'static,
    {
        self.config.fetch = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Shares an externally owned interrupt token with the engine, e.g. one
    /// wired to Ctrl-C by the caller.
    pub fn interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Creates the [`DownloadEngine`]. Fails when the underlying HTTP
    /// client cannot be constructed.
    pub fn build(self) -> Result<DownloadEngine> {
        DownloadEngine::new(self.config, self.interrupt.unwrap_or_default())
    }
}
