// crates/keploy-client/src/file.rs
// ============================================================================
// Module: Keploy File Control Plane
// Description: Control plane backed by YAML documents on disk.
// Purpose: Export recordings for review and replay them without a server.
// Dependencies: serde_yaml, serde_json, keploy-core
// ============================================================================

//! ## Overview
//! Layout under the configured directories:
//!
//! - `<test_case_path>/<id>.yaml`: one testcase document.
//! - `<mock_path>/<id>.yaml`: a YAML stream of the testcase's mocks, in call
//!   order.
//! - `<report_path>/<run_id>.yaml`: the graded report of a finished run.
//!
//! Every document has the fixed shape `version`, `kind`, `name`, `spec`, and
//! maps inside `spec` are emitted with sorted keys, so re-recording the
//! same traffic produces byte-stable files.
//!
//! Security posture: document names become file names; identifiers that are
//! not a single plain path component are rejected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;
use keploy_config::AppConfig;
use keploy_core::AppId;
use keploy_core::ControlPlane;
use keploy_core::ControlPlaneError;
use keploy_core::DependencyMeta;
use keploy_core::MOCK_VERSION;
use keploy_core::Mock;
use keploy_core::MockSpec;
use keploy_core::ReportEntry;
use keploy_core::RunId;
use keploy_core::RunReport;
use keploy_core::RunStatus;
use keploy_core::TestResult;
use keploy_core::Testcase;
use keploy_core::TestcaseId;
use keploy_core::Verdict;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Kind label of run report documents.
pub const REPORT_KIND: &str = "TestRun";

/// Extension of every exported document.
const DOCUMENT_EXTENSION: &str = "yaml";

// ============================================================================
// SECTION: Document Envelope
// ============================================================================

/// Envelope shared by every exported document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document schema version.
    pub version: String,
    /// Payload kind label.
    pub kind: String,
    /// Document name.
    pub name: String,
    /// Kind-specific payload with sorted keys.
    pub spec: Value,
}

impl Document {
    /// Wraps a serializable payload.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Io`] when the payload cannot be
    /// represented as a document tree.
    pub fn new<T: Serialize>(
        kind: &str,
        name: &str,
        spec: &T,
    ) -> Result<Self, ControlPlaneError> {
        Ok(Self {
            version: MOCK_VERSION.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            spec: serde_json::to_value(spec).map_err(|err| io_error("encode", name, &err))?,
        })
    }

    /// Decodes the payload.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Protocol`] for an unknown version or a
    /// payload of the wrong shape.
    pub fn decode<T: for<'de> Deserialize<'de>>(self) -> Result<T, ControlPlaneError> {
        if self.version != MOCK_VERSION {
            return Err(ControlPlaneError::Protocol(format!(
                "document {} has unsupported version {}",
                self.name, self.version
            )));
        }
        serde_json::from_value(self.spec).map_err(|err| {
            ControlPlaneError::Protocol(format!("document {} is malformed: {err}", self.name))
        })
    }
}

/// Mock payload as stored in a mock document.
#[derive(Debug, Serialize, Deserialize)]
struct MockBody {
    /// Call description.
    meta: DependencyMeta,
    /// Typed payload.
    spec: MockSpec,
}

// ============================================================================
// SECTION: Control Plane
// ============================================================================

/// Control plane persisting documents under local directories.
#[derive(Debug)]
pub struct FileControlPlane {
    /// Directory of testcase documents.
    test_case_path: PathBuf,
    /// Directory of mock streams.
    mock_path: PathBuf,
    /// Directory of run reports.
    report_path: PathBuf,
    /// Open runs keyed by run id.
    runs: Mutex<BTreeMap<String, RunReport>>,
}

impl FileControlPlane {
    /// Creates a control plane over the given directories.
    ///
    /// Reports land in `<test_case_path>/reports` unless overridden.
    #[must_use]
    pub fn new(test_case_path: impl Into<PathBuf>, mock_path: impl Into<PathBuf>) -> Self {
        let test_case_path = test_case_path.into();
        Self {
            report_path: test_case_path.join("reports"),
            test_case_path,
            mock_path: mock_path.into(),
            runs: Mutex::new(BTreeMap::new()),
        }
    }

    /// Creates a control plane from the `[app]` export settings.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Io`] when either path is missing.
    pub fn from_config(app: &AppConfig) -> Result<Self, ControlPlaneError> {
        let test_case_path = app
            .test_case_path
            .as_deref()
            .ok_or_else(|| ControlPlaneError::Io("app.test_case_path is not set".to_string()))?;
        let mock_path = app
            .mock_path
            .as_deref()
            .ok_or_else(|| ControlPlaneError::Io("app.mock_path is not set".to_string()))?;
        Ok(Self::new(test_case_path, mock_path))
    }

    /// Writes run reports to `report_path`.
    #[must_use]
    pub fn with_report_path(mut self, report_path: impl Into<PathBuf>) -> Self {
        self.report_path = report_path.into();
        self
    }

    /// Returns the path of the report written for `run_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Rejected`] for an unsafe run id.
    pub fn report_file(&self, run_id: &RunId) -> Result<PathBuf, ControlPlaneError> {
        document_path(&self.report_path, run_id.as_str())
    }

    /// Reads one testcase document, without its mocks.
    fn read_testcase(&self, id: &TestcaseId) -> Result<Option<Testcase>, ControlPlaneError> {
        let path = document_path(&self.test_case_path, id.as_str())?;
        let Some(content) = read_optional(&path)? else {
            return Ok(None);
        };
        let document: Document = parse_yaml(&path, &content)?;
        document.decode().map(Some)
    }

    /// Reads the mock stream of a testcase.
    fn read_mocks(&self, id: &TestcaseId) -> Result<Vec<Mock>, ControlPlaneError> {
        let path = document_path(&self.mock_path, id.as_str())?;
        let Some(content) = read_optional(&path)? else {
            return Ok(Vec::new());
        };
        let mut mocks = Vec::new();
        for raw in serde_yaml::Deserializer::from_str(&content) {
            let document = Document::deserialize(raw)
                .map_err(|err| io_error("parse", &path.display().to_string(), &err))?;
            let name = document.name.clone();
            let version = document.version.clone();
            let body: MockBody = document.decode()?;
            mocks.push(Mock {
                version,
                name,
                meta: body.meta,
                spec: body.spec,
            });
        }
        Ok(mocks)
    }

    /// Replaces the mock stream of a testcase.
    fn write_mocks(&self, id: &TestcaseId, mocks: &[Mock]) -> Result<(), ControlPlaneError> {
        let path = document_path(&self.mock_path, id.as_str())?;
        if mocks.is_empty() {
            return match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(io_error("remove", &path.display().to_string(), &err)),
            };
        }
        let mut stream = String::new();
        for (index, mock) in mocks.iter().enumerate() {
            let name =
                if mock.name.is_empty() { format!("mock-{index}") } else { mock.name.clone() };
            let body = MockBody {
                meta: mock.meta.clone(),
                spec: mock.spec.clone(),
            };
            let document = Document::new(mock.spec.kind(), &name, &body)?;
            if index > 0 {
                stream.push_str("---\n");
            }
            stream.push_str(&to_yaml(&document)?);
        }
        write_atomic(&path, &stream)
    }

    /// Locks the open-run table.
    fn runs(&self) -> Result<MutexGuard<'_, BTreeMap<String, RunReport>>, ControlPlaneError> {
        self.runs
            .lock()
            .map_err(|_| ControlPlaneError::Io("run table mutex poisoned".to_string()))
    }
}

#[async_trait]
impl ControlPlane for FileControlPlane {
    async fn put_testcase(&self, testcase: &Testcase) -> Result<TestcaseId, ControlPlaneError> {
        let mut testcase = testcase.clone();
        if testcase.id.is_empty() {
            testcase.id = TestcaseId::generate();
        }
        let mocks = std::mem::take(&mut testcase.mocks);
        let path = document_path(&self.test_case_path, testcase.id.as_str())?;
        let document = Document::new(testcase.kind.as_str(), testcase.id.as_str(), &testcase)?;
        write_atomic(&path, &to_yaml(&document)?)?;
        if !mocks.is_empty() {
            self.write_mocks(&testcase.id, &mocks)?;
        }
        debug!(testcase_id = %testcase.id, path = %path.display(), "testcase exported");
        Ok(testcase.id)
    }

    async fn put_mock(
        &self,
        testcase_id: &TestcaseId,
        mock: &Mock,
    ) -> Result<(), ControlPlaneError> {
        let mut mocks = self.read_mocks(testcase_id)?;
        mocks.push(mock.clone());
        self.write_mocks(testcase_id, &mocks)
    }

    async fn get_testcases(&self, app_id: &AppId) -> Result<Vec<Testcase>, ControlPlaneError> {
        let entries = match fs::read_dir(&self.test_case_path) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(io_error("list", &self.test_case_path.display().to_string(), &err));
            }
        };
        let mut testcases = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|err| io_error("list", &self.test_case_path.display().to_string(), &err))?
                .path();
            let is_document =
                path.extension().and_then(|ext| ext.to_str()) == Some(DOCUMENT_EXTENSION);
            if !is_document || !path.is_file() {
                continue;
            }
            let content = fs::read_to_string(&path)
                .map_err(|err| io_error("read", &path.display().to_string(), &err))?;
            let document: Document = parse_yaml(&path, &content)?;
            let mut testcase: Testcase = document.decode()?;
            if testcase.app_id != *app_id {
                continue;
            }
            testcase.mocks = self.read_mocks(&testcase.id)?;
            testcases.push(testcase);
        }
        testcases.sort_by(|a, b| a.captured_at.cmp(&b.captured_at).then_with(|| a.id.cmp(&b.id)));
        Ok(testcases)
    }

    async fn start_run(&self, app_id: &AppId, total: usize) -> Result<RunId, ControlPlaneError> {
        let run_id = RunId::generate();
        let report = RunReport::new(run_id.clone(), app_id.clone(), total);
        self.runs()?.insert(run_id.as_str().to_string(), report);
        Ok(run_id)
    }

    async fn post_result(&self, result: &TestResult) -> Result<Verdict, ControlPlaneError> {
        let expected = self
            .read_testcase(&result.tc_id)?
            .ok_or_else(|| rejected(404, format!("unknown testcase {}", result.tc_id)))?
            .http_resp
            .unwrap_or_default();
        let verdict = Verdict::compare(&expected, &result.actual_resp);
        let mut runs = self.runs()?;
        let report = runs
            .get_mut(result.run_id.as_str())
            .ok_or_else(|| rejected(404, format!("unknown run {}", result.run_id)))?;
        report.results.push(ReportEntry {
            tc_id: result.tc_id.clone(),
            pass: verdict.pass,
            actual_resp: result.actual_resp.clone(),
        });
        drop(runs);
        Ok(verdict)
    }

    async fn end_run(&self, run_id: &RunId, status: RunStatus) -> Result<(), ControlPlaneError> {
        let mut report = self
            .runs()?
            .remove(run_id.as_str())
            .ok_or_else(|| rejected(404, format!("unknown run {run_id}")))?;
        report.status = Some(status);
        let path = self.report_file(run_id)?;
        let document = Document::new(REPORT_KIND, run_id.as_str(), &report)?;
        write_atomic(&path, &to_yaml(&document)?)?;
        debug!(run_id = %run_id, status = status.as_str(), path = %path.display(), "run report written");
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves `<dir>/<name>.yaml`, rejecting names that escape `dir`.
fn document_path(dir: &Path, name: &str) -> Result<PathBuf, ControlPlaneError> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if !plain {
        return Err(rejected(400, format!("invalid document name '{name}'")));
    }
    Ok(dir.join(format!("{name}.{DOCUMENT_EXTENSION}")))
}

/// Reads a file, mapping absence to `None`.
fn read_optional(path: &Path) -> Result<Option<String>, ControlPlaneError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_error("read", &path.display().to_string(), &err)),
    }
}

/// Parses one YAML document.
fn parse_yaml<T: for<'de> Deserialize<'de>>(
    path: &Path,
    content: &str,
) -> Result<T, ControlPlaneError> {
    serde_yaml::from_str(content).map_err(|err| io_error("parse", &path.display().to_string(), &err))
}

/// Renders a document as YAML.
fn to_yaml(document: &Document) -> Result<String, ControlPlaneError> {
    serde_yaml::to_string(document).map_err(|err| io_error("encode", &document.name, &err))
}

/// Writes `content` through a sibling temp file and a rename.
fn write_atomic(path: &Path, content: &str) -> Result<(), ControlPlaneError> {
    let display = path.display().to_string();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| io_error("create", &display, &err))?;
    }
    let tmp = path.with_extension(format!("{DOCUMENT_EXTENSION}.tmp"));
    fs::write(&tmp, content).map_err(|err| io_error("write", &display, &err))?;
    fs::rename(&tmp, path).map_err(|err| io_error("rename", &display, &err))
}

/// Builds an io error with the failing action and target.
fn io_error(action: &str, target: &str, err: &dyn std::fmt::Display) -> ControlPlaneError {
    ControlPlaneError::Io(format!("{action} {target}: {err}"))
}

/// Builds a rejection error.
const fn rejected(status: u16, message: String) -> ControlPlaneError {
    ControlPlaneError::Rejected {
        status,
        message,
    }
}
