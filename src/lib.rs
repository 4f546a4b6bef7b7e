//! Pacfetch is a resumable, multi-mirror download engine for package
//! caches: it fetches package archives and their detached signatures from a
//! ranked list of mirror servers into a local cache directory, with `.part`
//! temp-file discipline, conditional GETs, range resume, size caps,
//! cooperative cancellation, and atomic publication.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use pacfetch::{EngineBuilder, Payload};
//!
//! # #[tokio::main]
//! # async fn main() -> pacfetch::Result<()> {
//! let engine = EngineBuilder::new().parallel_downloads(4).build()?;
//!
//! let mut payloads = vec![
//!     Payload::new(
//!         vec![
//!             "https://mirror-a.example.org/core".into(),
//!             "https://mirror-b.example.org/core".into(),
//!         ],
//!         "foo-1-1.pkg.tar.zst",
//!     )
//!     .with_resume(true),
//! ];
//!
//! engine
//!     .download_all(&mut payloads, Path::new("/var/cache/pkg"))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`payload`] - per-file download requests and their attempt state
//! - [`engine`] - the [`DownloadEngine`], its builder, and both drivers
//! - [`cache`] - the file cache lookup boundary
//! - [`pkgurl`] - fetching a package by URL with its `.sig` companion
//! - [`events`] - lifecycle events and the callback type
//! - [`interrupt`] - cooperative cancellation
//! - [`error`] - centralized error handling with the [`Error`] enum
//! - [`progress`] - optional indicatif rendering of the event stream
//! - [`utils`] - URL and path helpers

pub mod cache;
pub mod engine;
pub mod error;
pub mod events;
pub mod interrupt;
pub mod payload;
pub mod pkgurl;
pub mod progress;
pub mod utils;

mod partfile;

pub use cache::{DirCache, FileCache};
pub use engine::{
    DownloadEngine, EngineBuilder, FetchCallback, SigPolicy, Transfer, TransferStatus,
};
pub use error::{Error, Result};
pub use events::{DownloadEvent, EventCallback};
pub use interrupt::Interrupt;
pub use payload::Payload;
pub use pkgurl::fetch_package_url;
pub use progress::{ProgressBarOpts, ProgressRenderer, StyleOptions};
