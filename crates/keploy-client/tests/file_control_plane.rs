// crates/keploy-client/tests/file_control_plane.rs
// ============================================================================
// Module: File Control Plane Tests
// Description: Export, read-back, and run reports on a temp directory.
// Purpose: Validate the YAML document layout and its stability.
// Dependencies: keploy-client, tempfile, tokio
// ============================================================================

//! File-backed control-plane tests over temporary directories.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::fs;

use keploy_client::Document;
use keploy_client::FileControlPlane;
use keploy_client::REPORT_KIND;
use keploy_core::AppId;
use keploy_core::ControlPlane;
use keploy_core::ControlPlaneError;
use keploy_core::HttpResponse;
use keploy_core::MOCK_VERSION;
use keploy_core::RunReport;
use keploy_core::RunStatus;
use keploy_core::TestResult;
use keploy_core::TestcaseId;
use tempfile::TempDir;

use crate::common::sample_mock;
use crate::common::sample_testcase;

fn plane(dir: &TempDir) -> FileControlPlane {
    FileControlPlane::new(dir.path().join("tests"), dir.path().join("mocks"))
}

// ============================================================================
// SECTION: Export
// ============================================================================

#[tokio::test]
async fn exported_testcase_reads_back_with_its_mocks() {
    let dir = TempDir::new().unwrap();
    let plane = plane(&dir);
    let mut testcase = sample_testcase("tc-1", "users", 100);
    testcase.mocks.push(sample_mock("billing-0", 200));

    let id = plane.put_testcase(&testcase).await.unwrap();
    assert_eq!(id, TestcaseId::new("tc-1"));
    assert!(dir.path().join("tests/tc-1.yaml").is_file());
    assert!(dir.path().join("mocks/tc-1.yaml").is_file());

    let fetched = plane.get_testcases(&AppId::new("users")).await.unwrap();
    assert_eq!(fetched, vec![testcase]);
}

#[tokio::test]
async fn documents_have_fixed_envelope_and_stable_bytes() {
    let dir = TempDir::new().unwrap();
    let plane = plane(&dir);
    let testcase = sample_testcase("tc-1", "users", 100);
    let path = dir.path().join("tests/tc-1.yaml");

    plane.put_testcase(&testcase).await.unwrap();
    let first = fs::read_to_string(&path).unwrap();
    plane.put_testcase(&testcase).await.unwrap();
    let second = fs::read_to_string(&path).unwrap();
    assert_eq!(first, second);

    let header = format!("version: {MOCK_VERSION}\nkind: Http\nname: tc-1\nspec:\n");
    assert!(first.starts_with(&header), "unexpected document head: {first}");
    let app_at = first.find("  app_id:").unwrap();
    let deps_at = first.find("  deps:").unwrap();
    let http_req_at = first.find("  http_req:").unwrap();
    assert!(app_at < deps_at && deps_at < http_req_at);
}

#[tokio::test]
async fn put_mock_appends_in_call_order() {
    let dir = TempDir::new().unwrap();
    let plane = plane(&dir);
    plane.put_testcase(&sample_testcase("tc-1", "users", 1)).await.unwrap();
    let id = TestcaseId::new("tc-1");

    plane.put_mock(&id, &sample_mock("first", 200)).await.unwrap();
    plane.put_mock(&id, &sample_mock("", 404)).await.unwrap();

    let content = fs::read_to_string(dir.path().join("mocks/tc-1.yaml")).unwrap();
    assert_eq!(content.matches("kind: Http").count(), 2);
    let fetched = plane.get_testcases(&AppId::new("users")).await.unwrap();
    let names: Vec<&str> = fetched[0].mocks.iter().map(|mock| mock.name.as_str()).collect();
    assert_eq!(names, vec!["first", "mock-1"]);
}

#[tokio::test]
async fn fetch_filters_by_app_and_orders_by_capture_time() {
    let dir = TempDir::new().unwrap();
    let plane = plane(&dir);
    plane.put_testcase(&sample_testcase("late", "users", 300)).await.unwrap();
    plane.put_testcase(&sample_testcase("early", "users", 100)).await.unwrap();
    plane.put_testcase(&sample_testcase("other", "billing", 200)).await.unwrap();

    let fetched = plane.get_testcases(&AppId::new("users")).await.unwrap();
    let ids: Vec<&str> = fetched.iter().map(|tc| tc.id.as_str()).collect();
    assert_eq!(ids, vec!["early", "late"]);
}

#[tokio::test]
async fn missing_directory_lists_nothing() {
    let dir = TempDir::new().unwrap();
    let fetched = plane(&dir).get_testcases(&AppId::new("users")).await.unwrap();
    assert!(fetched.is_empty());
}

#[tokio::test]
async fn path_escaping_ids_are_rejected() {
    let dir = TempDir::new().unwrap();
    let plane = plane(&dir);
    let err = plane.put_testcase(&sample_testcase("../escape", "users", 1)).await.unwrap_err();
    assert!(matches!(err, ControlPlaneError::Rejected { status: 400, .. }));
    assert!(!dir.path().join("escape.yaml").exists());
}

// ============================================================================
// SECTION: Runs
// ============================================================================

#[tokio::test]
async fn run_report_records_graded_results() {
    let dir = TempDir::new().unwrap();
    let plane = plane(&dir);
    let recorded = sample_testcase("tc-1", "users", 1);
    plane.put_testcase(&recorded).await.unwrap();

    let run_id = plane.start_run(&AppId::new("users"), 2).await.unwrap();
    let pass = plane
        .post_result(&TestResult {
            run_id: run_id.clone(),
            tc_id: TestcaseId::new("tc-1"),
            actual_resp: recorded.http_resp.clone().unwrap(),
        })
        .await
        .unwrap();
    let fail = plane
        .post_result(&TestResult {
            run_id: run_id.clone(),
            tc_id: TestcaseId::new("tc-1"),
            actual_resp: HttpResponse {
                status_code: 500,
                ..HttpResponse::default()
            },
        })
        .await
        .unwrap();
    assert!(pass.pass);
    assert!(!fail.pass);
    plane.end_run(&run_id, RunStatus::Failed).await.unwrap();

    let content = fs::read_to_string(plane.report_file(&run_id).unwrap()).unwrap();
    let document: Document = serde_yaml::from_str(&content).unwrap();
    assert_eq!(document.kind, REPORT_KIND);
    let report: RunReport = document.decode().unwrap();
    assert_eq!(report.status, Some(RunStatus::Failed));
    assert_eq!(report.total, 2);
    let verdicts: Vec<bool> = report.results.iter().map(|entry| entry.pass).collect();
    assert_eq!(verdicts, vec![true, false]);

    let again = plane.end_run(&run_id, RunStatus::Passed).await.unwrap_err();
    assert!(matches!(again, ControlPlaneError::Rejected { status: 404, .. }));
}

#[tokio::test]
async fn results_for_unknown_testcases_are_rejected() {
    let dir = TempDir::new().unwrap();
    let plane = plane(&dir);
    let run_id = plane.start_run(&AppId::new("users"), 1).await.unwrap();
    let err = plane
        .post_result(&TestResult {
            run_id,
            tc_id: TestcaseId::new("ghost"),
            actual_resp: HttpResponse::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ControlPlaneError::Rejected { status: 404, .. }));
}
