//! Event-driven progress rendering.
//!
//! [`ProgressRenderer`] draws one child bar per active payload plus a main
//! bar counting payloads, fed purely by the engine's lifecycle events. The
//! engine itself knows nothing about rendering; the renderer is installed
//! as an ordinary event callback. Signature payloads never emit events, so
//! they never show up here.
//!
//! # Examples
//!
//! ```rust,no_run
//! use pacfetch::progress::{ProgressRenderer, StyleOptions};
//! use pacfetch::EngineBuilder;
//!
//! # fn main() -> pacfetch::Result<()> {
//! let renderer = ProgressRenderer::new(StyleOptions::default(), 3);
//! let engine = EngineBuilder::new()
//!     .on_event(renderer.handler())
//!     .build()?;
//! // ... run downloads ...
//! renderer.finish();
//! # let _ = engine;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget};

use crate::events::DownloadEvent;
use crate::progress::StyleOptions;

/// Renders engine events as indicatif progress bars.
pub struct ProgressRenderer {
    multi: MultiProgress,
    main: ProgressBar,
    style: StyleOptions,
    active: Mutex<HashMap<String, ProgressBar>>,
}

impl ProgressRenderer {
    /// Creates a renderer expecting `total_payloads` payloads.
    pub fn new(style: StyleOptions, total_payloads: usize) -> Arc<Self> {
        let multi = match style.is_enabled() {
            true => MultiProgress::new(),
            false => MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        };
        let main = multi.add(style.main().clone().to_progress_bar(total_payloads as u64));
        main.tick();

        Arc::new(Self {
            multi,
            main,
            style,
            active: Mutex::new(HashMap::new()),
        })
    }

    /// Returns a closure suitable for
    /// [`EngineBuilder::on_event`](crate::EngineBuilder::on_event).
    pub fn handler(self: &Arc<Self>) -> impl Fn(&str, &DownloadEvent) + Send + Sync + 'static {
        let renderer = Arc::clone(self);
        move |name, event| renderer.on_event(name, event)
    }

    fn on_event(&self, name: &str, event: &DownloadEvent) {
        match event {
            DownloadEvent::Init { .. } => {
                let bar = self
                    .multi
                    .add(self.style.child().clone().to_progress_bar(0));
                bar.set_message(name.to_string());
                self.active
                    .lock()
                    .expect("progress renderer poisoned")
                    .insert(name.to_string(), bar);
            }
            DownloadEvent::Progress { total, downloaded } => {
                if let Some(bar) = self
                    .active
                    .lock()
                    .expect("progress renderer poisoned")
                    .get(name)
                {
                    bar.set_length(*total);
                    bar.set_position(*downloaded);
                }
            }
            DownloadEvent::Completed { .. } => {
                let removed = self
                    .active
                    .lock()
                    .expect("progress renderer poisoned")
                    .remove(name);
                if let Some(bar) = removed {
                    if self.style.child().clear {
                        bar.finish_and_clear();
                    } else {
                        bar.finish();
                    }
                }
                self.main.inc(1);
            }
        }
    }

    /// Finishes the main bar, clearing or keeping it per the style options.
    pub fn finish(&self) {
        if self.style.main().clear {
            self.main.finish_and_clear();
        } else {
            self.main.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressBarOpts;

    fn hidden_renderer(total: usize) -> Arc<ProgressRenderer> {
        ProgressRenderer::new(
            StyleOptions::new(ProgressBarOpts::hidden(), ProgressBarOpts::hidden()),
            total,
        )
    }

    #[test]
    fn init_creates_a_child_bar() {
        let renderer = hidden_renderer(1);
        renderer.on_event("foo.pkg", &DownloadEvent::Init { optional: false });
        assert!(renderer.active.lock().unwrap().contains_key("foo.pkg"));
    }

    #[test]
    fn progress_updates_the_child_bar() {
        let renderer = hidden_renderer(1);
        renderer.on_event("foo.pkg", &DownloadEvent::Init { optional: false });
        renderer.on_event(
            "foo.pkg",
            &DownloadEvent::Progress {
                total: 4096,
                downloaded: 1024,
            },
        );
        let active = renderer.active.lock().unwrap();
        let bar = active.get("foo.pkg").unwrap();
        assert_eq!(bar.length(), Some(4096));
        assert_eq!(bar.position(), 1024);
    }

    #[test]
    fn completed_retires_the_child_and_advances_main() {
        let renderer = hidden_renderer(2);
        renderer.on_event("foo.pkg", &DownloadEvent::Init { optional: false });
        renderer.on_event(
            "foo.pkg",
            &DownloadEvent::Completed {
                total: 4096,
                result: 0,
            },
        );
        assert!(!renderer.active.lock().unwrap().contains_key("foo.pkg"));
        assert_eq!(renderer.main.position(), 1);
    }

    #[test]
    fn progress_for_unknown_payload_is_ignored() {
        let renderer = hidden_renderer(1);
        renderer.on_event(
            "never-announced.pkg",
            &DownloadEvent::Progress {
                total: 10,
                downloaded: 5,
            },
        );
        assert!(renderer.active.lock().unwrap().is_empty());
    }
}
