//! Cooperative cancellation for running transfers.
//!
//! The engine never installs signal handlers. Instead every driver call
//! accepts the engine's [`Interrupt`] token and polls it once per received
//! chunk; the caller decides what feeds the token (typically
//! `tokio::signal::ctrl_c`). Tripping the token makes every in-flight
//! transfer stop at its next progress tick, apply its temp-file policy
//! (keep-for-resume or unlink), and surface [`Error::Cancelled`] — which is
//! never demoted to an optional failure.
//!
//! [`Error::Cancelled`]: crate::Error::Cancelled
//!
//! # Examples
//!
//! ```rust,no_run
//! use pacfetch::Interrupt;
//!
//! # async fn example() {
//! let interrupt = Interrupt::new();
//! let watcher = interrupt.clone();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     watcher.cancel();
//! });
//! # }
//! ```

use tokio_util::sync::CancellationToken;

/// Clonable cancellation token shared by an engine and its callers.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    token: CancellationToken,
}

impl Interrupt {
    /// Creates a fresh, untripped token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the token. All transfers polling it abort at their next chunk.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the token has been tripped.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
