// system-tests/tests/suites/record_replay.rs
// ============================================================================
// Module: Record and Replay Scenarios
// Description: SQL-backed lookups recorded live and replayed offline.
// Purpose: Cover the single-query, replay, and two-row cursor scenarios.
// ============================================================================

use keploy_core::RunStatus;
use system_tests::service::LIST_QUERY;
use system_tests::service::USER_QUERY;

use crate::helpers::harness::by_url;
use crate::helpers::harness::operations;
use crate::helpers::harness::record;
use crate::helpers::harness::replay;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lookup_is_recorded_with_its_query_sequence() {
    let recorded = record(&["/users/42"]).await;
    assert_eq!(recorded.len(), 1);
    let testcase = &recorded[0];

    let request = testcase.http_req.as_ref().unwrap();
    assert_eq!(request.method, "GET");
    assert_eq!(request.url, "/users/42");
    assert_eq!(
        operations(testcase),
        ["QueryContext", "QueryContext.Next", "QueryContext.Next", "QueryContext.Close"]
    );
    let head = &testcase.deps[0].meta;
    assert_eq!(head.name(), "SQL");
    assert_eq!(head.kind(), "SqlDB");
    assert_eq!(head.get("query"), Some(USER_QUERY));

    let response = testcase.http_resp.as_ref().unwrap();
    assert_eq!(response.status_code, 200);
    assert!(response.body.contains("\"Ash\""), "body was {}", response.body);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lookup_replays_without_a_database() {
    let recorded = record(&["/users/42"]).await;
    let (service, plane, summary) = replay(recorded).await;

    assert_eq!(summary.status, RunStatus::Passed);
    assert_eq!(summary.passed(), 1);
    assert_eq!(service.backend.calls(), 0);
    assert_eq!(service.registry.pending().unwrap(), 0);

    let report = plane.run(&summary.run_id).unwrap().unwrap();
    let actual = &report.results[0].actual_resp;
    assert_eq!(actual.status_code, 200);
    assert!(actual.body.contains("\"Ash\""));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_row_cursor_replays_in_recorded_order() {
    let recorded = record(&["/users"]).await;
    let testcase = by_url(&recorded, "/users");
    assert_eq!(
        operations(testcase),
        [
            "QueryContext",
            "QueryContext.Next",
            "QueryContext.Next",
            "QueryContext.Next",
            "QueryContext.Close"
        ]
    );
    assert_eq!(testcase.deps[0].meta.get("query"), Some(LIST_QUERY));
    assert!(testcase.http_resp.as_ref().unwrap().body.contains(r#"["Ash","Brock"]"#));

    let (service, _, summary) = replay(recorded).await;
    assert_eq!(summary.status, RunStatus::Passed);
    assert_eq!(service.backend.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_end_of_rows_record_still_ends_iteration() {
    let mut recorded = record(&["/users"]).await;
    // Drop the recorded end-of-rows step; the cursor must stop on its own.
    let removed = recorded[0].deps.remove(3);
    assert_eq!(removed.meta.operation(), "QueryContext.Next");

    let (service, _, summary) = replay(recorded).await;
    assert_eq!(summary.status, RunStatus::Passed);
    assert_eq!(service.backend.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn separate_lookups_replay_in_one_run() {
    let recorded = record(&["/users/42", "/users/43", "/users"]).await;
    assert_eq!(recorded.len(), 3);
    assert!(by_url(&recorded, "/users/43").http_resp.as_ref().unwrap().body.contains("Brock"));

    let (service, plane, summary) = replay(recorded).await;
    assert_eq!(summary.status, RunStatus::Passed);
    assert_eq!(summary.passed(), 3);
    assert_eq!(plane.run(&summary.run_id).unwrap().unwrap().total, 3);
    assert_eq!(service.backend.calls(), 0);
}
