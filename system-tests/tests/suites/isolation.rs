// system-tests/tests/suites/isolation.rs
// ============================================================================
// Module: Isolation Scenarios
// Description: Concurrent replayed requests with distinct test ids.
// Purpose: Show each request observes only its own dependency sequence.
// ============================================================================

use std::sync::Arc;

use keploy_core::InMemoryControlPlane;
use keploy_core::Mode;
use keploy_core::TestcaseId;
use tokio::task::JoinSet;

use crate::helpers::harness::Service;
use crate::helpers::harness::by_url;
use crate::helpers::harness::record;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_replays_do_not_cross_contaminate() {
    const REQUESTS: usize = 16;

    let recorded = record(&["/users/42", "/users/43"]).await;
    let ash = by_url(&recorded, "/users/42");
    let brock = by_url(&recorded, "/users/43");
    assert_ne!(ash.deps, brock.deps);

    let service = Arc::new(Service::start(Mode::Test, Arc::new(InMemoryControlPlane::new())).await);
    let mut tasks = JoinSet::new();
    for index in 0 .. REQUESTS {
        let mut testcase = if index % 2 == 0 { ash.clone() } else { brock.clone() };
        testcase.id = TestcaseId::new(format!("tc-{index}"));
        let completion = service.registry.register(&testcase).unwrap();
        let url = testcase.http_req.as_ref().unwrap().url.clone();
        let expected = testcase.http_resp.as_ref().unwrap().body.clone();
        let service = Arc::clone(&service);
        tasks.spawn(async move {
            let (status, body) = service.get_as(&url, testcase.id.as_str()).await;
            let completed = completion.await.unwrap();
            (status, expected, body, completed.body)
        });
    }

    let mut finished = 0;
    while let Some(joined) = tasks.join_next().await {
        let (status, expected, body, completed) = joined.unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, expected);
        assert_eq!(completed, expected);
        finished += 1;
    }
    assert_eq!(finished, REQUESTS);
    assert_eq!(service.backend.calls(), 0);
    assert_eq!(service.registry.pending().unwrap(), 0);
}
