// system-tests/tests/suites/clock.rs
// ============================================================================
// Module: Clock Scenarios
// Description: Wall-clock substitution during replay.
// Purpose: Show a handler echoing "now" replays the capture instant.
// ============================================================================

use std::sync::Arc;

use keploy_core::InMemoryControlPlane;
use keploy_core::Mode;
use keploy_core::RunStatus;
use keploy_core::Timestamp;

use crate::helpers::harness::Launch;
use crate::helpers::harness::Service;
use crate::helpers::harness::T0;
use crate::helpers::harness::replay;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replay_echoes_the_capture_instant() {
    let plane = Arc::new(InMemoryControlPlane::new());
    let recorder = Service::launch(
        Mode::Record,
        Arc::clone(&plane) as _,
        Launch {
            frozen_at: Some(Timestamp::from_unix_seconds(T0)),
            ..Launch::default()
        },
    )
    .await;
    let (status, body) = recorder.get("/now").await;
    assert_eq!(status, 200);
    assert!(body.contains("1700000000"), "body was {body}");
    recorder.flush().await;

    let recorded = plane.testcases().unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].captured_at, Timestamp::from_unix_seconds(T0));
    assert!(recorded[0].deps.is_empty());

    // The replaying service runs on the real wall clock.
    let (service, replay_plane, summary) = replay(recorded).await;
    assert_eq!(summary.status, RunStatus::Passed);
    let report = replay_plane.run(&summary.run_id).unwrap().unwrap();
    assert!(report.results[0].actual_resp.body.contains("1700000000"));

    let (_, live) = service.get("/now").await;
    assert!(!live.contains("1700000000"), "live body was {live}");
}
