use std::time::Duration;

use goesview_core::{DispatchLimiter, JobOutcome};

mod support;
use support::Harness;

#[tokio::test]
async fn scan_fills_every_missing_entry() {
    let harness = Harness::new().await;
    harness.write_image("a.jpg");
    harness.write_image("b/c.png");
    harness.write_bytes("b/notes.txt", b"not an image");

    let report = harness.reconciler().scan_once().await.unwrap();
    assert_eq!(report.discovered, 2);
    assert_eq!(report.enqueued, 2);
    harness.queue().wait_idle().await;

    assert_eq!(harness.cache_entries(), vec!["a.jpg.jpg", "b%2Fc.png.jpg"]);
}

#[tokio::test]
async fn scan_keeps_entries_for_removed_sources() {
    let harness = Harness::new().await;
    let source = harness.write_image("gone.png");
    harness.write_image("kept.png");

    let scanner = harness.reconciler();
    scanner.scan_once().await.unwrap();
    harness.queue().wait_idle().await;

    std::fs::remove_file(source).unwrap();
    let report = scanner.scan_once().await.unwrap();
    assert_eq!(report.discovered, 1);
    assert_eq!(report.cached, 1);
    assert_eq!(report.enqueued, 0);

    assert_eq!(harness.cache_entries(), vec!["gone.png.jpg", "kept.png.jpg"]);
}

#[tokio::test]
async fn scan_skips_unrecognized_cache_files() {
    let harness = Harness::new().await;
    harness.write_image("a.png");
    std::fs::write(harness.cache_dir.path().join("stray%zz.jpg"), b"?").unwrap();

    let report = harness.reconciler().scan_once().await.unwrap();
    assert_eq!(report.unrecognized, 1);
    assert_eq!(report.enqueued, 1);
}

#[tokio::test]
async fn interactive_request_overtakes_a_background_backlog() {
    let harness = Harness::with_limits(
        1,
        DispatchLimiter::new(100, Duration::from_millis(10)),
        Duration::from_millis(30),
    )
    .await;
    for idx in 0..6 {
        harness.write_image(&format!("backlog/{idx}.png"));
    }
    harness.write_image("wanted.png");

    let mut backlog = Vec::new();
    for idx in 0..6 {
        backlog.push(
            harness
                .cache
                .prefetch(&format!("backlog/{idx}.png"))
                .await
                .unwrap(),
        );
    }

    harness.cache.get("wanted.png").await.unwrap();
    let finished = backlog
        .iter()
        .filter(|handle| handle.try_outcome() == Some(JobOutcome::Rendered))
        .count();
    // At most the job already on the single worker got ahead of it.
    assert!(finished <= 1, "{finished} background jobs ran first");

    harness.queue().wait_idle().await;
}

#[tokio::test]
async fn scan_progress_reaches_processed_total() {
    let harness = Harness::new().await;
    for idx in 0..4 {
        harness.write_image(&format!("d/{idx}.jpg"));
    }

    let scanner = harness.reconciler();
    scanner.scan_once().await.unwrap();
    harness.queue().wait_idle().await;

    let progress = scanner.progress();
    for _ in 0..200 {
        if progress.snapshot().processed == 4 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let snapshot = progress.snapshot();
    assert_eq!(snapshot.discovered, 4);
    assert_eq!(snapshot.enqueued, 4);
    assert_eq!(snapshot.processed, 4);
}
