//! Error handling for the pacfetch library.
//!
//! This module provides centralized error handling for the download engine.
//! The variants mirror the failure categories a transfer can hit: bad mirror
//! configuration, transport failures, retrieval failures reported by the
//! server, local I/O failures, and the two abort categories (size cap and
//! cancellation) that are enforced while a body is streaming.

use std::io;
use thiserror::Error;

/// Errors that can happen while fetching files.
#[derive(Error, Debug)]
pub enum Error {
    /// The payload's mirror list was empty at admission time.
    #[error("no servers configured for download")]
    ServerNone,

    /// The URL could not be parsed, or its host could not be resolved or
    /// connected to.
    #[error("url '{url}' is invalid")]
    ServerBadUrl {
        /// The offending URL.
        url: String,
    },

    /// The server answered but the file could not be retrieved: an HTTP
    /// error status, or a body shorter than the size the server advertised.
    #[error("failed retrieving file: {reason}")]
    Retrieve {
        /// Short description, e.g. the HTTP status line or truncation sizes.
        reason: String,
    },

    /// Any other transport-level failure.
    #[error("transport error")]
    Transport {
        #[from]
        source: reqwest_middleware::Error,
    },

    /// No data arrived on the wire for the low-speed window.
    #[error("download stalled: no data received for {0} seconds")]
    Stalled(u64),

    /// Local I/O failure (open, truncate, rename).
    #[error("I/O error")]
    System {
        #[from]
        source: io::Error,
    },

    /// The transfer would have exceeded the payload's size cap.
    #[error("expected download size exceeded ({limit} bytes)")]
    SizeExceeded {
        /// The configured cap in bytes.
        limit: u64,
    },

    /// The interrupt token was tripped while the transfer was running.
    ///
    /// Never demoted by `errors_ok`: a cancelled batch always tears down.
    #[error("download cancelled")]
    Cancelled,

    /// The user-supplied fetch callback failed on every mirror.
    #[error("external download callback failed")]
    ExternalDownload,
}

impl From<reqwest::Error> for Error {
    fn from(source: reqwest::Error) -> Self {
        Self::Transport {
            source: source.into(),
        }
    }
}

/// Result type alias for operations that can fail with a pacfetch [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
