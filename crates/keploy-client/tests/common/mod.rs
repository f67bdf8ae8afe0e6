// crates/keploy-client/tests/common/mod.rs
// =============================================================================
// Module: Client Test Helpers
// Description: Fake control-plane server and testcase fixtures.
// Purpose: Share setup between the HTTP and file control-plane suites.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::thread;
use std::thread::JoinHandle;

use keploy_config::ServerConfig;
use keploy_core::AppId;
use keploy_core::Dependency;
use keploy_core::DependencyKind;
use keploy_core::DependencyMeta;
use keploy_core::HttpMockSpec;
use keploy_core::HttpRequest;
use keploy_core::HttpResponse;
use keploy_core::Mock;
use keploy_core::MockSpec;
use keploy_core::Testcase;
use keploy_core::TestcaseId;
use keploy_core::Timestamp;
use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;

/// Request observed by the fake server.
#[derive(Debug, Clone)]
pub struct Captured {
    /// Request method.
    pub method: String,
    /// Path and query.
    pub url: String,
    /// Header lines as lowercase name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: String,
}

impl Captured {
    /// Returns the first value of `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Canned reply: status, extra headers, body.
pub type Reply = (u16, Vec<(&'static str, &'static str)>, String);

/// Serves `expected` requests, answering each with `responder`.
///
/// Returns the server base URL (with `/api`) and a handle yielding the
/// observed requests.
pub fn spawn_server<F>(expected: usize, responder: F) -> (String, JoinHandle<Vec<Captured>>)
where
    F: Fn(usize, &Captured) -> Reply + Send + 'static,
{
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for index in 0 .. expected {
            let Ok(mut request) = server.recv() else {
                break;
            };
            let mut body = String::new();
            request.as_reader().read_to_string(&mut body).unwrap();
            let captured = Captured {
                method: request.method().as_str().to_string(),
                url: request.url().to_string(),
                headers: request
                    .headers()
                    .iter()
                    .map(|header| {
                        (header.field.as_str().as_str().to_ascii_lowercase(), header.value.to_string())
                    })
                    .collect(),
                body,
            };
            let (status, headers, reply) = responder(index, &captured);
            let mut response = Response::from_string(reply).with_status_code(status);
            for (name, value) in headers {
                response.add_header(Header::from_bytes(name.as_bytes(), value.as_bytes()).unwrap());
            }
            let _ = request.respond(response);
            seen.push(captured);
        }
        seen
    });
    (format!("http://{addr}/api"), handle)
}

/// Server settings pointing at `url`.
pub fn server_config(url: &str) -> ServerConfig {
    ServerConfig {
        url: url.to_string(),
        api_key: Some("secret-key".to_string()),
        page_size: 2,
        ..ServerConfig::default()
    }
}

/// HTTP testcase with one dependency.
pub fn sample_testcase(id: &str, app: &str, captured_at: i64) -> Testcase {
    let request = HttpRequest {
        method: "GET".to_string(),
        proto_major: 1,
        proto_minor: 1,
        url: format!("/users/{id}"),
        body: String::new(),
        ..HttpRequest::default()
    };
    let mut response = HttpResponse {
        status_code: 200,
        body: r#"{"name":"Ash"}"#.to_string(),
        ..HttpResponse::default()
    };
    response.header.insert("content-type".to_string(), vec!["application/json".to_string()]);
    let mut testcase = Testcase::http(
        TestcaseId::new(id),
        AppId::new(app),
        Timestamp::from_unix_seconds(captured_at),
        request,
        response,
    );
    testcase.deps.push(Dependency::new(
        DependencyMeta::new("SQL", DependencyKind::SqlDb, "QueryContext").with("query", "SELECT 1"),
        vec![vec![1, 2, 3], vec![0]],
    ));
    testcase.noise.push("header.date".to_string());
    testcase
}

/// Outbound HTTP mock with a fixed name.
pub fn sample_mock(name: &str, status: u16) -> Mock {
    let mut mock = Mock::new(
        DependencyMeta::new("http-client", DependencyKind::HttpClient, "Do"),
        MockSpec::Http(HttpMockSpec {
            request: HttpRequest {
                method: "GET".to_string(),
                url: "http://billing/invoices".to_string(),
                ..HttpRequest::default()
            },
            response: HttpResponse {
                status_code: status,
                body: "[]".to_string(),
                ..HttpResponse::default()
            },
            err: None,
            body_base64: false,
        }),
    );
    mock.name = name.to_string();
    mock
}

/// Serializes testcases as a JSON page.
pub fn page(testcases: &[Testcase]) -> String {
    serde_json::to_string(testcases).unwrap()
}
