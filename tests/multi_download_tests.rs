//! Tests for the multi-transfer driver: parallel batches, mirror failover,
//! optional payload demotion, halt-on-failure, and signature silence.

use pacfetch::{DownloadEvent, EngineBuilder, Error, Payload, TransferStatus};

mod common;
use common::helpers::*;

#[tokio::test]
async fn batch_downloads_every_payload() {
    let cache = create_temp_dir();
    let log = EventLog::new();
    let engine = EngineBuilder::new()
        .parallel_downloads(3)
        .on_event(log.handler())
        .build()
        .unwrap();

    let mut server = mockito::Server::new_async().await;
    for i in 0..3 {
        server
            .mock("GET", format!("/core/pkg-{i}.tar.zst").as_str())
            .with_status(200)
            .with_body(test_body(512 * (i + 1)))
            .create_async()
            .await;
    }

    let mut payloads: Vec<Payload> = (0..3)
        .map(|i| Payload::new(vec![server.url()], format!("core/pkg-{i}.tar.zst")))
        .collect();
    engine
        .download_all(&mut payloads, cache.path())
        .await
        .unwrap();

    for i in 0..3usize {
        let name = format!("pkg-{i}.tar.zst");
        assert_file_size(&cache.path().join(&name), 512 * (i as u64 + 1));
        assert!(!cache.path().join(format!("{name}.part")).exists());
        assert_event_ordering(&log.for_name(&name));
    }
}

#[tokio::test]
async fn failover_promotes_the_next_mirror() {
    let cache = create_temp_dir();
    let log = EventLog::new();
    let engine = engine_with_events(&log);
    let body = test_body(4096);

    let mut down = mockito::Server::new_async().await;
    down.mock("GET", "/core/foo-1-1.pkg.tar.zst")
        .with_status(404)
        .create_async()
        .await;
    let mut up = mockito::Server::new_async().await;
    let mock = up
        .mock("GET", "/core/foo-1-1.pkg.tar.zst")
        .with_status(200)
        .with_body(&body)
        .create_async()
        .await;

    let mut payloads = vec![Payload::new(vec![down.url(), up.url()], PKG_PATH)];
    engine
        .download_all(&mut payloads, cache.path())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(std::fs::read(cache.path().join(PKG_NAME)).unwrap(), body);

    // one admission, one terminal event, success from the second mirror
    let events = log.for_name(PKG_NAME);
    assert_event_ordering(&events);
    let completed: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, DownloadEvent::Completed { .. }))
        .collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(
        completed[0],
        &DownloadEvent::Completed {
            total: 4096,
            result: 0
        }
    );
}

#[tokio::test]
async fn failover_to_unreachable_then_live_mirror() {
    let cache = create_temp_dir();
    let engine = EngineBuilder::new().build().unwrap();
    let body = test_body(1024);

    let mut up = mockito::Server::new_async().await;
    up.mock("GET", "/core/foo-1-1.pkg.tar.zst")
        .with_status(200)
        .with_body(&body)
        .create_async()
        .await;

    // port 9 (discard) refuses connections immediately
    let mut payloads = vec![Payload::new(
        vec!["http://127.0.0.1:9".into(), up.url()],
        PKG_PATH,
    )];
    engine
        .download_all(&mut payloads, cache.path())
        .await
        .unwrap();

    assert_eq!(std::fs::read(cache.path().join(PKG_NAME)).unwrap(), body);
}

#[tokio::test]
async fn exhausted_mirrors_fail_the_batch() {
    let cache = create_temp_dir();
    let engine = EngineBuilder::new().build().unwrap();

    let mut s1 = mockito::Server::new_async().await;
    s1.mock("GET", "/core/foo-1-1.pkg.tar.zst")
        .with_status(404)
        .create_async()
        .await;
    let mut s2 = mockito::Server::new_async().await;
    s2.mock("GET", "/core/foo-1-1.pkg.tar.zst")
        .with_status(500)
        .create_async()
        .await;

    let mut payloads = vec![Payload::new(vec![s1.url(), s2.url()], PKG_PATH)];
    let err = engine
        .download_all(&mut payloads, cache.path())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Retrieve { .. }));
    assert!(!cache.path().join(PKG_NAME).exists());
}

#[tokio::test]
async fn required_failure_stops_admission() {
    let cache = create_temp_dir();
    let log = EventLog::new();
    let engine = EngineBuilder::new()
        .parallel_downloads(1)
        .on_event(log.handler())
        .build()
        .unwrap();

    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/core/broken.tar.zst")
        .with_status(404)
        .create_async()
        .await;
    let never = server
        .mock("GET", "/core/never-started.tar.zst")
        .expect(0)
        .create_async()
        .await;

    let mut payloads = vec![
        Payload::new(vec![server.url()], "core/broken.tar.zst"),
        Payload::new(vec![server.url()], "core/never-started.tar.zst"),
    ];
    let err = engine
        .download_all(&mut payloads, cache.path())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Retrieve { .. }));
    never.assert_async().await;
    // the skipped payload produced no events and no files
    assert!(log.for_name("never-started.tar.zst").is_empty());
    assert!(!cache.path().join("never-started.tar.zst").exists());
}

#[tokio::test]
async fn optional_failure_does_not_stop_the_batch() {
    let cache = create_temp_dir();
    let engine = EngineBuilder::new().parallel_downloads(1).build().unwrap();
    let body = test_body(2048);

    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/core/foo-1-1.pkg.tar.zst.sig")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/core/foo-1-1.pkg.tar.zst")
        .with_status(200)
        .with_body(&body)
        .create_async()
        .await;

    let mut payloads = vec![
        Payload::new(vec![server.url()], format!("{PKG_PATH}.sig"))
            .as_signature()
            .with_errors_ok(true)
            .with_max_size(16 * 1024),
        Payload::new(vec![server.url()], PKG_PATH),
    ];
    engine
        .download_all(&mut payloads, cache.path())
        .await
        .unwrap();

    // package kept, signature absent, no error surfaced
    assert_eq!(std::fs::read(cache.path().join(PKG_NAME)).unwrap(), body);
    assert!(!cache.path().join(format!("{PKG_NAME}.sig")).exists());
}

#[tokio::test]
async fn signature_payloads_emit_no_events() {
    let cache = create_temp_dir();
    let log = EventLog::new();
    let engine = engine_with_events(&log);

    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/core/foo-1-1.pkg.tar.zst.sig")
        .with_status(200)
        .with_body(b"detached signature bytes")
        .create_async()
        .await;

    let mut payloads = vec![Payload::new(vec![server.url()], format!("{PKG_PATH}.sig"))
        .as_signature()
        .with_max_size(16 * 1024)];
    engine
        .download_all(&mut payloads, cache.path())
        .await
        .unwrap();

    assert!(cache.path().join(format!("{PKG_NAME}.sig")).exists());
    assert!(log.all().is_empty(), "signature payloads must stay silent");
}

#[tokio::test]
async fn empty_server_list_is_rejected() {
    let cache = create_temp_dir();
    let engine = EngineBuilder::new().build().unwrap();

    let mut payloads = vec![Payload::new(Vec::new(), PKG_PATH)];
    let err = engine
        .download_all(&mut payloads, cache.path())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ServerNone));
}

#[tokio::test]
async fn external_fetch_iterates_mirrors() {
    let cache = create_temp_dir();
    let attempts = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = attempts.clone();
    let engine = EngineBuilder::new()
        .fetch_callback(move |url, dir, _force| {
            seen.lock().unwrap().push(url.to_string());
            if url.starts_with("https://good") {
                let name = url.rsplit('/').next().unwrap();
                std::fs::write(dir.join(name), b"external").ok()?;
                Some(TransferStatus::Downloaded)
            } else {
                None
            }
        })
        .build()
        .unwrap();

    let mut payloads = vec![Payload::new(
        vec!["https://bad.example.org".into(), "https://good.example.org".into()],
        PKG_PATH,
    )];
    engine
        .download_all(&mut payloads, cache.path())
        .await
        .unwrap();

    let attempts = attempts.lock().unwrap();
    assert_eq!(attempts.len(), 2);
    assert!(attempts[0].starts_with("https://bad"));
    assert!(attempts[1].starts_with("https://good"));
    assert!(cache.path().join(PKG_NAME).exists());
}

#[tokio::test]
async fn external_fetch_failure_on_all_mirrors_errors() {
    let cache = create_temp_dir();
    let engine = EngineBuilder::new()
        .fetch_callback(|_url, _dir, _force| None)
        .build()
        .unwrap();

    let mut payloads = vec![Payload::new(
        vec!["https://a.example.org".into(), "https://b.example.org".into()],
        PKG_PATH,
    )];
    let err = engine
        .download_all(&mut payloads, cache.path())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ExternalDownload));
}
