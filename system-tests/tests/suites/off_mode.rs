// system-tests/tests/suites/off_mode.rs
// ============================================================================
// Module: Off Mode Scenarios
// Description: Instrumented service with the mode switched off.
// Purpose: Show off mode reaches the database and records nothing.
// ============================================================================

use std::sync::Arc;

use keploy_core::InMemoryControlPlane;
use keploy_core::Mode;

use crate::helpers::harness::Service;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn off_mode_hits_the_database_and_records_nothing() {
    let plane = Arc::new(InMemoryControlPlane::new());
    let service = Service::start(Mode::Off, Arc::clone(&plane) as _).await;

    let (status, body) = service.get("/users/42").await;
    assert_eq!(status, 200);
    assert!(body.contains("\"Ash\""));
    assert_eq!(service.backend.calls(), 1);

    // A test id is ignored too: the lookup still runs live.
    let (status, body) = service.get_as("/users/43", "tc-ignored").await;
    assert_eq!(status, 200);
    assert!(body.contains("\"Brock\""));
    assert_eq!(service.backend.calls(), 2);

    for _ in 0 .. 3 {
        let (_, repeat) = service.get("/users/42").await;
        assert!(repeat.contains("\"Ash\""));
    }
    assert_eq!(service.backend.calls(), 5);

    service.flush().await;
    assert!(plane.testcases().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_user_is_a_live_not_found() {
    let plane = Arc::new(InMemoryControlPlane::new());
    let service = Service::start(Mode::Off, Arc::clone(&plane) as _).await;
    let (status, body) = service.get("/users/7").await;
    assert_eq!(status, 404);
    assert!(body.contains("user not found"));
}
