// crates/keploy-client/src/http.rs
// ============================================================================
// Module: Keploy HTTP Control Plane
// Description: JSON-over-HTTP client of the testcase/mock server.
// Purpose: Upsert recordings, page testcases, and report replay results.
// Dependencies: reqwest, serde_json, url, keploy-core
// ============================================================================

//! ## Overview
//! Every operation is a single JSON request against the configured server
//! URL:
//!
//! | Operation       | Request                                   | Reply              |
//! |-----------------|-------------------------------------------|--------------------|
//! | `put_testcase`  | `POST regression/testcase`                | `{"id": ...}`      |
//! | `put_mock`      | `POST regression/mock`                    | ignored            |
//! | `get_testcases` | `GET regression/testcase?app&offset&limit`| `[Testcase]`, `EOF`|
//! | `start_run`     | `POST regression/start`                   | `{"id": ...}`      |
//! | `post_result`   | `POST regression/test`                    | `{"pass": ...}`    |
//! | `end_run`       | `POST regression/end`                     | ignored            |
//!
//! Security posture: server replies are untrusted; bodies are read with a
//! hard size limit, redirects are not followed, and the API key is never
//! logged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use keploy_config::ServerConfig;
use keploy_core::AppId;
use keploy_core::ControlPlane;
use keploy_core::ControlPlaneError;
use keploy_core::Mock;
use keploy_core::RunId;
use keploy_core::RunStatus;
use keploy_core::TestResult;
use keploy_core::Testcase;
use keploy_core::TestcaseId;
use keploy_core::Verdict;
use reqwest::Client;
use reqwest::Method;
use reqwest::Response;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderValue;
use reqwest::redirect::Policy;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "key";

/// Header set to `true` on the last testcase page.
pub const EOF_HEADER: &str = "EOF";

/// Upper bound on pages fetched for one app.
const MAX_PAGES: usize = 10_000;

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Reply carrying a server-assigned identifier.
#[derive(Debug, Deserialize)]
struct IdReply {
    /// Assigned identifier.
    id: String,
}

/// Body of a mock upsert.
#[derive(Debug, Serialize)]
struct MockUpsert<'a> {
    /// Owning testcase.
    test_case_id: &'a TestcaseId,
    /// Mock document.
    mock: &'a Mock,
}

/// Body opening a run.
#[derive(Debug, Serialize)]
struct StartRun<'a> {
    /// Application under test.
    app: &'a AppId,
    /// Number of testcases announced.
    total: usize,
}

/// Body closing a run.
#[derive(Debug, Serialize)]
struct EndRun<'a> {
    /// Run identifier.
    id: &'a RunId,
    /// Final status.
    status: RunStatus,
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Control plane reached over HTTP.
#[derive(Clone)]
pub struct HttpControlPlane {
    /// Shared HTTP client.
    client: Client,
    /// Base URL; always ends with `/`.
    base: Url,
    /// Optional API key.
    api_key: Option<HeaderValue>,
    /// Maximum accepted reply size.
    max_response_bytes: usize,
    /// Testcases requested per page.
    page_size: usize,
}

impl std::fmt::Debug for HttpControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpControlPlane")
            .field("base", &self.base.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("max_response_bytes", &self.max_response_bytes)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl HttpControlPlane {
    /// Builds a client from server settings.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Protocol`] when the URL or API key is
    /// unusable and [`ControlPlaneError::Unavailable`] when the HTTP client
    /// cannot be constructed.
    pub fn new(config: &ServerConfig) -> Result<Self, ControlPlaneError> {
        let mut base = Url::parse(config.url.trim())
            .map_err(|err| ControlPlaneError::Protocol(format!("invalid server url: {err}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let api_key = config
            .api_key
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|_| ControlPlaneError::Protocol("invalid api key header".to_string()))?
            .map(|mut value| {
                value.set_sensitive(true);
                value
            });
        let client = Client::builder()
            .timeout(config.timeout())
            .redirect(Policy::none())
            .build()
            .map_err(|err| ControlPlaneError::Unavailable(err.to_string()))?;
        Ok(Self {
            client,
            base,
            api_key,
            max_response_bytes: config.max_response_bytes,
            page_size: config.page_size.max(1),
        })
    }

    /// Resolves an endpoint below the base URL.
    fn endpoint(&self, path: &str) -> Result<Url, ControlPlaneError> {
        self.base
            .join(path)
            .map_err(|err| ControlPlaneError::Protocol(format!("invalid endpoint {path}: {err}")))
    }

    /// Sends a request and returns the response when its status is a success.
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<Response, ControlPlaneError> {
        let mut request = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key.clone());
        }
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }
        let response = request
            .send()
            .await
            .map_err(|err| ControlPlaneError::Unavailable(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = read_body_with_limit(response, self.max_response_bytes).await?;
        Err(ControlPlaneError::Rejected {
            status: status.as_u16(),
            message: String::from_utf8_lossy(&body).trim().to_string(),
        })
    }

    /// Posts a JSON body and decodes the JSON reply.
    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ControlPlaneError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response = self.post(path, body).await?;
        let bytes = read_body_with_limit(response, self.max_response_bytes).await?;
        decode(&bytes)
    }

    /// Posts a JSON body, returning the raw response.
    async fn post<B>(&self, path: &str, body: &B) -> Result<Response, ControlPlaneError>
    where
        B: Serialize + Sync,
    {
        let payload = serde_json::to_vec(body)
            .map_err(|err| ControlPlaneError::Protocol(format!("request encoding failed: {err}")))?;
        self.send(Method::POST, self.endpoint(path)?, Some(payload)).await
    }

    /// Fetches one testcase page; returns the page and the EOF flag.
    async fn fetch_page(
        &self,
        app_id: &AppId,
        offset: usize,
    ) -> Result<(Vec<Testcase>, bool), ControlPlaneError> {
        let mut url = self.endpoint("regression/testcase")?;
        url.query_pairs_mut()
            .append_pair("app", app_id.as_str())
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &self.page_size.to_string());
        let response = self.send(Method::GET, url, None).await?;
        let eof = response
            .headers()
            .get(EOF_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"));
        let bytes = read_body_with_limit(response, self.max_response_bytes).await?;
        let page: Option<Vec<Testcase>> = decode(&bytes)?;
        Ok((page.unwrap_or_default(), eof))
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn put_testcase(&self, testcase: &Testcase) -> Result<TestcaseId, ControlPlaneError> {
        let reply: IdReply = self.post_json("regression/testcase", testcase).await?;
        Ok(TestcaseId::new(reply.id))
    }

    async fn put_mock(
        &self,
        testcase_id: &TestcaseId,
        mock: &Mock,
    ) -> Result<(), ControlPlaneError> {
        let body = MockUpsert {
            test_case_id: testcase_id,
            mock,
        };
        self.post("regression/mock", &body).await?;
        Ok(())
    }

    async fn get_testcases(&self, app_id: &AppId) -> Result<Vec<Testcase>, ControlPlaneError> {
        let mut testcases = Vec::new();
        for _ in 0 .. MAX_PAGES {
            let (page, eof) = self.fetch_page(app_id, testcases.len()).await?;
            let fetched = page.len();
            testcases.extend(page);
            if eof || fetched == 0 {
                debug!(app_id = %app_id, count = testcases.len(), "testcases fetched");
                return Ok(testcases);
            }
        }
        Err(ControlPlaneError::Protocol(format!(
            "testcase listing did not terminate after {MAX_PAGES} pages"
        )))
    }

    async fn start_run(&self, app_id: &AppId, total: usize) -> Result<RunId, ControlPlaneError> {
        let body = StartRun {
            app: app_id,
            total,
        };
        let reply: IdReply = self.post_json("regression/start", &body).await?;
        Ok(RunId::new(reply.id))
    }

    async fn post_result(&self, result: &TestResult) -> Result<Verdict, ControlPlaneError> {
        self.post_json("regression/test", result).await
    }

    async fn end_run(&self, run_id: &RunId, status: RunStatus) -> Result<(), ControlPlaneError> {
        let body = EndRun {
            id: run_id,
            status,
        };
        self.post("regression/end", &body).await?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Decodes a JSON reply.
fn decode<R: DeserializeOwned>(bytes: &[u8]) -> Result<R, ControlPlaneError> {
    serde_json::from_slice(bytes)
        .map_err(|err| ControlPlaneError::Protocol(format!("invalid reply: {err}")))
}

/// Reads a response body while enforcing a hard byte limit.
async fn read_body_with_limit(
    mut response: Response,
    limit: usize,
) -> Result<Vec<u8>, ControlPlaneError> {
    let mut body = Vec::new();
    while let Some(chunk) =
        response.chunk().await.map_err(|err| ControlPlaneError::Unavailable(err.to_string()))?
    {
        let total = body.len().saturating_add(chunk.len());
        if total > limit {
            return Err(ControlPlaneError::Protocol(format!(
                "reply exceeds size limit ({total} > {limit})"
            )));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
