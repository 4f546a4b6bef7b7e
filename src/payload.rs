//! Download payloads.
//!
//! A [`Payload`] describes one file to fetch: where it lives (either a ranked
//! mirror list plus a server-relative path, or one fully-qualified URL), how
//! to fetch it (resume, force, size cap), and how failures are treated.
//! The request half of the record is set up once by the caller; everything
//! the drivers mutate while a transfer runs lives in the separate
//! [`AttemptState`], so retries have a clearly typed subset of fields to
//! clear.
//!
//! # Examples
//!
//! ```rust
//! use pacfetch::Payload;
//!
//! // A package fetched from whichever of two mirrors answers first.
//! let payload = Payload::new(
//!     vec![
//!         "https://mirror-a.example.org/core".into(),
//!         "https://mirror-b.example.org/core".into(),
//!     ],
//!     "foo-1-1.pkg.tar.zst",
//! )
//! .with_resume(true);
//!
//! // Its detached signature: optional, capped, and silent.
//! let sig = Payload::from_url("https://mirror-a.example.org/core/foo-1-1.pkg.tar.zst.sig")
//!     .as_signature()
//!     .with_max_size(16 * 1024);
//! # let _ = (payload, sig);
//! ```

use std::path::PathBuf;

use crate::utils::urls;

/// How the part file is opened for the current attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum OpenMode {
    /// Start from scratch.
    #[default]
    Truncate,
    /// Continue a previous partial download.
    Append,
}

/// Mutable per-attempt bookkeeping, cleared between retries.
#[derive(Debug, Clone, Default)]
pub(crate) struct AttemptState {
    /// Index of the current mirror within [`Payload::servers`].
    pub server_idx: usize,
    /// Fully-qualified URL of the current attempt.
    pub fileurl: Option<String>,
    /// Short name used in events and to derive local names.
    pub remote_name: Option<String>,
    /// Absolute path of the in-progress file.
    pub tempfile_name: Option<PathBuf>,
    /// Absolute path of the published file; absent for tempfile-only
    /// transfers.
    pub destfile_name: Option<PathBuf>,
    /// Filename parsed from a Content-Disposition header.
    pub content_disp_name: Option<String>,
    /// Last observed HTTP response status.
    pub respcode: u16,
    /// Bytes already present locally when the attempt began.
    pub initial_size: u64,
    /// Last reported cumulative progress, for duplicate suppression.
    pub prevprogress: u64,
    pub open_mode: OpenMode,
    /// Whether a failed or interrupted attempt deletes the temp file.
    pub unlink_on_fail: bool,
}

/// One file to download.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    /// Server-relative path, reused across mirror failover.
    pub filepath: String,
    /// Ordered mirror base URLs. Attempts walk this list front to back.
    pub servers: Vec<String>,
    /// Upper bound on total downloaded bytes; `0` means no cap.
    pub max_size: u64,
    /// Resume from an existing `.part` file instead of starting over.
    pub allow_resume: bool,
    /// Skip the If-Modified-Since check even when the destination exists.
    pub force: bool,
    /// Treat transfer failures as tolerable (optional payload).
    pub errors_ok: bool,
    /// Rename the published file from server-provided hints
    /// (Content-Disposition, effective URL tail).
    pub trust_remote_name: bool,
    /// Detached-signature companion: all lifecycle events are suppressed.
    pub signature: bool,

    pub(crate) state: AttemptState,
}

impl Payload {
    /// Creates a payload fetched as `<server>/<filepath>` from the first
    /// responsive mirror in `servers`.
    pub fn new(servers: Vec<String>, filepath: impl Into<String>) -> Self {
        Self {
            filepath: filepath.into(),
            servers,
            ..Self::default()
        }
    }

    /// Creates a payload for a single fully-qualified URL, bypassing the
    /// mirror list.
    pub fn from_url(url: impl Into<String>) -> Self {
        let mut payload = Self::default();
        payload.state.fileurl = Some(url.into());
        payload
    }

    /// Sets the size cap in bytes.
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Enables or disables `.part` resume.
    pub fn with_resume(mut self, allow_resume: bool) -> Self {
        self.allow_resume = allow_resume;
        self
    }

    /// Forces the download even when the local copy looks current.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Marks the payload as optional: its failure is logged, not surfaced.
    pub fn with_errors_ok(mut self, errors_ok: bool) -> Self {
        self.errors_ok = errors_ok;
        self
    }

    /// Trusts server-provided filename hints when publishing.
    pub fn with_trust_remote_name(mut self, trust: bool) -> Self {
        self.trust_remote_name = trust;
        self
    }

    /// Marks the payload as a detached-signature companion.
    pub fn as_signature(mut self) -> Self {
        self.signature = true;
        self
    }

    /// Short name used in events. Populated from the URL tail before a
    /// transfer begins; empty only before admission.
    pub fn remote_name(&self) -> &str {
        self.state.remote_name.as_deref().unwrap_or("")
    }

    /// The mirror the current attempt runs against.
    pub(crate) fn current_server(&self) -> Option<&str> {
        self.servers.get(self.state.server_idx).map(String::as_str)
    }

    /// Advances to the next mirror. Returns `false` when none remain.
    pub(crate) fn advance_server(&mut self) -> bool {
        if self.state.server_idx + 1 < self.servers.len() {
            self.state.server_idx += 1;
            true
        } else {
            false
        }
    }

    /// Composes the attempt URL for the current mirror and stores it in the
    /// attempt state.
    pub(crate) fn rebuild_fileurl(&mut self) -> Option<&str> {
        let server = self.current_server()?;
        let url = format!("{}/{}", server.trim_end_matches('/'), self.filepath);
        self.state.fileurl = Some(url);
        self.state.fileurl.as_deref()
    }

    /// Ensures a remote name is present, deriving it from the attempt URL
    /// when the caller did not supply one.
    pub(crate) fn ensure_remote_name(&mut self) {
        if self.state.remote_name.as_deref().map_or(true, str::is_empty) {
            if let Some(url) = self.state.fileurl.as_deref() {
                self.state.remote_name = Some(urls::decoded_filename(url));
            }
        }
    }

    /// Returns the payload to its as-constructed state, dropping every
    /// per-attempt field.
    pub fn reset(&mut self) {
        self.state = AttemptState::default();
    }

    /// Prepares the payload for another driver call after a completed or
    /// failed attempt: destination naming survives, per-URL fields are
    /// cleared, and partial progress is promoted into `initial_size` so the
    /// next attempt resumes as if fresh at the current file size.
    pub fn reset_for_retry(&mut self) {
        self.state.fileurl = None;
        self.state.content_disp_name = None;
        self.state.respcode = 0;
        self.state.initial_size += self.state.prevprogress;
        self.state.prevprogress = 0;
        self.state.unlink_on_fail = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_payload_has_clean_state() {
        let payload = Payload::new(vec!["https://m1".into()], "core/foo.pkg");
        assert_eq!(payload.filepath, "core/foo.pkg");
        assert_eq!(payload.state.server_idx, 0);
        assert!(payload.state.fileurl.is_none());
        assert!(!payload.signature);
    }

    #[test]
    fn from_url_sets_fileurl_directly() {
        let payload = Payload::from_url("https://m1/core/foo.pkg");
        assert_eq!(payload.state.fileurl.as_deref(), Some("https://m1/core/foo.pkg"));
        assert!(payload.servers.is_empty());
    }

    #[test]
    fn rebuild_fileurl_joins_server_and_filepath() {
        let mut payload = Payload::new(vec!["https://m1/core/".into()], "foo.pkg");
        assert_eq!(payload.rebuild_fileurl(), Some("https://m1/core/foo.pkg"));
    }

    #[test]
    fn advance_server_walks_the_list_once() {
        let mut payload = Payload::new(vec!["https://a".into(), "https://b".into()], "f");
        assert!(payload.advance_server());
        assert_eq!(payload.current_server(), Some("https://b"));
        assert!(!payload.advance_server());
    }

    #[test]
    fn ensure_remote_name_decodes_url_tail() {
        let mut payload = Payload::from_url("https://m1/core/foo%2Bbar.pkg");
        payload.ensure_remote_name();
        assert_eq!(payload.remote_name(), "foo+bar.pkg");
    }

    #[test]
    fn reset_for_retry_promotes_progress() {
        let mut payload = Payload::new(vec!["https://m1".into()], "foo.pkg");
        payload.state.fileurl = Some("https://m1/foo.pkg".into());
        payload.state.initial_size = 100;
        payload.state.prevprogress = 400;
        payload.state.unlink_on_fail = true;
        payload.state.respcode = 500;

        payload.reset_for_retry();

        assert!(payload.state.fileurl.is_none());
        assert_eq!(payload.state.initial_size, 500);
        assert_eq!(payload.state.prevprogress, 0);
        assert!(!payload.state.unlink_on_fail);
        assert_eq!(payload.state.respcode, 0);
    }

    #[test]
    fn reset_clears_everything() {
        let mut payload = Payload::new(vec!["https://m1".into()], "foo.pkg");
        payload.state.remote_name = Some("foo.pkg".into());
        payload.state.initial_size = 10;
        payload.reset();
        assert!(payload.state.remote_name.is_none());
        assert_eq!(payload.state.initial_size, 0);
    }
}
