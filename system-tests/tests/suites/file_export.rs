// system-tests/tests/suites/file_export.rs
// ============================================================================
// Module: File Export Scenarios
// Description: Record into YAML documents, replay from the same directory.
// Purpose: Cover the file control plane end to end, including run reports.
// ============================================================================

use std::fs;
use std::path::Path;
use std::sync::Arc;

use keploy_client::FileControlPlane;
use keploy_core::Mode;
use keploy_core::RunStatus;
use system_tests::config::SystemTestConfig;
use tempfile::TempDir;

use crate::helpers::harness::Launch;
use crate::helpers::harness::Service;

fn export_dir() -> TempDir {
    match SystemTestConfig::load().unwrap().run_root {
        Some(root) => {
            fs::create_dir_all(&root).unwrap();
            tempfile::Builder::new().prefix("keploy-export-").tempdir_in(root).unwrap()
        }
        None => tempfile::tempdir().unwrap(),
    }
}

fn yaml_documents(dir: &Path) -> Vec<String> {
    let mut documents: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "yaml"))
        .map(|path| fs::read_to_string(path).unwrap())
        .collect();
    documents.sort();
    documents
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exported_testcases_replay_from_disk() {
    let dir = export_dir();
    let tests_dir = dir.path().join("tests");
    let mocks_dir = dir.path().join("mocks");

    let recorder = Service::launch(
        Mode::Record,
        Arc::new(FileControlPlane::new(&tests_dir, &mocks_dir)),
        Launch {
            file_export: true,
            ..Launch::default()
        },
    )
    .await;
    recorder.get("/users/42").await;
    recorder.get("/users").await;
    recorder.flush().await;

    let documents = yaml_documents(&tests_dir);
    assert_eq!(documents.len(), 2);
    for document in &documents {
        assert!(document.contains("version: api.keploy.io/v1beta1"), "document was {document}");
        assert!(document.contains("QueryContext"));
    }

    let plane = Arc::new(FileControlPlane::new(&tests_dir, &mocks_dir));
    let service = Service::start(Mode::Test, Arc::clone(&plane) as _).await;
    let summary = service.driver().run().await.unwrap();
    assert_eq!(summary.status, RunStatus::Passed);
    assert_eq!(summary.passed(), 2);
    assert_eq!(service.backend.calls(), 0);

    let report = fs::read_to_string(plane.report_file(&summary.run_id).unwrap()).unwrap();
    assert!(report.contains("TestRun"));
    assert!(report.contains(summary.run_id.as_str()));
}
