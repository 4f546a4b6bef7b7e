use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use pacfetch::{DownloadEngine, DownloadEvent, EngineBuilder};
use tempfile::TempDir;

// Common test constants
pub const PKG_NAME: &str = "foo-1-1.pkg.tar.zst";
pub const PKG_PATH: &str = "core/foo-1-1.pkg.tar.zst";
pub const LAST_MODIFIED: &str = "Mon, 06 Apr 2026 12:00:00 GMT";

/// Creates a temporary cache directory for testing purposes
pub fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temporary directory")
}

/// Creates deterministic file content of the given size
pub fn test_body(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

/// Writes a file into the cache directory and returns its path
pub fn write_cache_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write cache file");
    path
}

/// Asserts that a file exists with the expected size
pub fn assert_file_size(path: &Path, expected: u64) {
    let meta = std::fs::metadata(path)
        .unwrap_or_else(|_| panic!("file should exist at {}", path.display()));
    assert_eq!(meta.len(), expected, "size mismatch at {}", path.display());
}

/// Records every event the engine emits, keyed by remote name
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<(String, DownloadEvent)>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a closure for `EngineBuilder::on_event`
    pub fn handler(&self) -> impl Fn(&str, &DownloadEvent) + Send + Sync + 'static {
        let events = self.events.clone();
        move |name, event| {
            events
                .lock()
                .expect("event log poisoned")
                .push((name.to_string(), *event));
        }
    }

    pub fn all(&self) -> Vec<(String, DownloadEvent)> {
        self.events.lock().expect("event log poisoned").clone()
    }

    /// Events emitted for one payload, in order
    pub fn for_name(&self, name: &str) -> Vec<DownloadEvent> {
        self.all()
            .into_iter()
            .filter(|(n, _)| n == name)
            .map(|(_, e)| e)
            .collect()
    }

    pub fn progress_events(&self, name: &str) -> Vec<DownloadEvent> {
        self.for_name(name)
            .into_iter()
            .filter(|e| matches!(e, DownloadEvent::Progress { .. }))
            .collect()
    }
}

/// Builds an engine wired to the given event log
pub fn engine_with_events(log: &EventLog) -> DownloadEngine {
    EngineBuilder::new()
        .on_event(log.handler())
        .build()
        .expect("Failed to build engine")
}

/// Asserts the canonical per-payload ordering: Init, Progress*, Completed
pub fn assert_event_ordering(events: &[DownloadEvent]) {
    assert!(
        matches!(events.first(), Some(DownloadEvent::Init { .. })),
        "first event should be Init, got {events:?}"
    );
    assert!(
        matches!(events.last(), Some(DownloadEvent::Completed { .. })),
        "last event should be Completed, got {events:?}"
    );
    for event in &events[1..events.len() - 1] {
        assert!(
            matches!(event, DownloadEvent::Progress { .. }),
            "middle events should be Progress, got {events:?}"
        );
    }
}
