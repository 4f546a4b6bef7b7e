//! Download lifecycle events.
//!
//! The engine reports the lifecycle of every non-signature payload through a
//! single callback: one [`DownloadEvent::Init`] at admission, zero or more
//! deduplicated [`DownloadEvent::Progress`] ticks while the body streams, and
//! exactly one [`DownloadEvent::Completed`] at termination. Events are keyed
//! by the payload's remote name, so a frontend can multiplex many concurrent
//! transfers over one callback.
//!
//! # Examples
//!
//! ```rust
//! use pacfetch::{DownloadEvent, EngineBuilder};
//!
//! let engine = EngineBuilder::new()
//!     .on_event(|name, event| match event {
//!         DownloadEvent::Init { optional } => {
//!             println!("{name}: starting (optional: {optional})")
//!         }
//!         DownloadEvent::Progress { total, downloaded } => {
//!             println!("{name}: {downloaded}/{total}")
//!         }
//!         DownloadEvent::Completed { total, result } => {
//!             println!("{name}: done ({total} bytes, result {result})")
//!         }
//!     })
//!     .build();
//! # let _ = engine;
//! ```

use std::sync::Arc;

/// One step in a payload's download lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadEvent {
    /// The payload was admitted and its transfer is about to start.
    Init {
        /// Whether a failure of this payload is tolerated (`errors_ok`).
        optional: bool,
    },
    /// Bytes arrived. `total` and `downloaded` cover the current attempt's
    /// window only; bytes already on disk from a previous run are not part
    /// of the caller's accounting.
    Progress {
        /// Bytes remaining to download as advertised by the server.
        total: u64,
        /// Bytes downloaded so far within this attempt.
        downloaded: u64,
    },
    /// The transfer terminated.
    Completed {
        /// Bytes downloaded by the final attempt.
        total: u64,
        /// `0` downloaded, `1` already up to date, `-1` failed.
        result: i32,
    },
}

/// Callback type for download lifecycle events.
///
/// The first argument is the payload's remote name.
pub type EventCallback = Box<dyn Fn(&str, &DownloadEvent) + Send + Sync>;

/// Invoke the callback, if any.
pub(crate) fn emit(events: Option<&Arc<EventCallback>>, name: &str, event: DownloadEvent) {
    if let Some(cb) = events {
        cb(name, &event);
    }
}
