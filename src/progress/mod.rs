//! Progress module containing progress bar functionality.
//!
//! This module renders download lifecycle events as terminal progress bars.
//! It is an optional consumer of the engine's event stream: the engine
//! itself never draws anything, and frontends with their own UI simply
//! install a different event callback.
//!
//! # Overview
//!
//! - `style` - progress bar styling options and templates
//! - `renderer` - the event-driven [`ProgressRenderer`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use pacfetch::progress::{ProgressRenderer, StyleOptions};
//! use pacfetch::EngineBuilder;
//!
//! # fn main() -> pacfetch::Result<()> {
//! let renderer = ProgressRenderer::new(StyleOptions::default(), 5);
//! let engine = EngineBuilder::new().on_event(renderer.handler()).build()?;
//! # let _ = engine;
//! # Ok(())
//! # }
//! ```

pub(crate) mod renderer;
pub(crate) mod style;

pub use renderer::ProgressRenderer;
pub use style::{ProgressBarOpts, StyleOptions};
