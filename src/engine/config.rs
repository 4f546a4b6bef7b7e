//! Configuration structures and callback types for the download engine.
//!
//! The [`EngineConfig`] is assembled through [`EngineBuilder`] and owned by
//! the [`DownloadEngine`] for its lifetime; per-file knobs (resume, caps,
//! optionality) live on [`Payload`] instead.
//!
//! [`EngineBuilder`]: super::EngineBuilder
//! [`DownloadEngine`]: super::DownloadEngine
//! [`Payload`]: crate::Payload

use std::path::Path;
use std::sync::Arc;

use super::TransferStatus;
use crate::events::EventCallback;

/// Callback replacing the built-in transport entirely.
///
/// Arguments are the attempt URL, the directory to download into, and the
/// payload's `force` flag. `None` means this URL failed; mirrors are then
/// tried in order.
pub type FetchCallback = Box<dyn Fn(&str, &Path, bool) -> Option<TransferStatus> + Send + Sync>;

/// Whether detached signatures are fetched alongside packages, and whether
/// a missing signature is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigPolicy {
    /// Never fetch `.sig` companions.
    #[default]
    Never,
    /// Fetch them, but tolerate failures.
    Optional,
    /// Fetch them; a missing signature fails the package fetch.
    Required,
}

/// Engine-level configuration.
#[derive(Clone, Default)]
pub(crate) struct EngineConfig {
    /// Number of transfers run in parallel by the multi driver; clamped to
    /// at least 1.
    pub parallel_downloads: usize,
    /// Disable the stalled-transfer timeout (useful on very slow links).
    pub disable_download_timeout: bool,
    /// Signature companion policy for the package-URL entry point.
    pub sig_policy: SigPolicy,
    /// Overrides the transport User-Agent. When unset, the
    /// `HTTP_USER_AGENT` environment variable is honored.
    pub user_agent: Option<String>,
    /// Lifecycle event callback.
    pub events: Option<Arc<EventCallback>>,
    /// External fetch callback bypassing the built-in transport.
    pub fetch: Option<Arc<FetchCallback>>,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("parallel_downloads", &self.parallel_downloads)
            .field("disable_download_timeout", &self.disable_download_timeout)
            .field("sig_policy", &self.sig_policy)
            .field("user_agent", &self.user_agent)
            .field("events", &self.events.is_some())
            .field("fetch", &self.fetch.is_some())
            .finish()
    }
}

impl EngineConfig {
    pub(crate) fn effective_parallel(&self) -> usize {
        self.parallel_downloads.max(1)
    }
}
