//! `PlatformClient` against a local axum stand-in for the platform REST API.
//!
//! The stand-in answers from a route table and records every request, so the
//! tests can check both what the client returns and what it sent.

#![cfg(feature = "server")]

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use markdown_conversion::error::PlatformError;
use markdown_conversion::platform::http::PlatformClient;
use markdown_conversion::platform::NewArtifact;
use markdown_conversion::{
    ConversionJob, ConversionRequest, ConverterRegistry, MetadataIndex, ObjectContent,
    ObjectStore, ServiceConfig, DEFAULT_POLICY, RESULT_SCHEMA,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

// ── Test platform ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    headers: HeaderMap,
    body: Bytes,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

type RouteKey = (Method, String);

#[derive(Clone, Default)]
struct FakePlatform {
    routes: Arc<Mutex<HashMap<RouteKey, (StatusCode, Vec<u8>)>>>,
    seen: Arc<Mutex<Vec<Recorded>>>,
}

impl FakePlatform {
    fn on(&self, method: Method, path: &str, status: StatusCode, body: impl Into<Vec<u8>>) {
        self.routes
            .lock()
            .unwrap()
            .insert((method, path.to_string()), (status, body.into()));
    }

    fn on_json(&self, method: Method, path: &str, body: Value) {
        self.on(method, path, StatusCode::OK, body.to_string());
    }

    fn request(&self, method: Method, path: &str) -> Recorded {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.method == method && r.path == path)
            .cloned()
            .unwrap_or_else(|| panic!("no {method} {path} request recorded"))
    }

    /// Serve on an ephemeral port and return the base URL.
    async fn start(&self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(answer).with_state(self.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }
}

async fn answer(
    State(fake): State<FakePlatform>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    fake.seen.lock().unwrap().push(Recorded {
        method: method.clone(),
        path: path.clone(),
        query,
        headers,
        body,
    });
    let route = fake.routes.lock().unwrap().get(&(method, path)).cloned();
    match route {
        Some((status, body)) => (status, body).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn client(base: &str, token: Option<&str>) -> PlatformClient {
    let mut builder = ServiceConfig::builder()
        .platform_url(base)
        .platform_timeout_secs(10);
    if let Some(token) = token {
        builder = builder.auth_token(token);
    }
    PlatformClient::new(&builder.build().unwrap()).unwrap()
}

fn markdown_artifact(name: &str, policy: &str, text: &'static str) -> NewArtifact {
    NewArtifact {
        name: name.to_string(),
        content_type: "text/markdown".to_string(),
        size: text.len() as u64,
        policy: policy.to_string(),
        content: ObjectContent::from_bytes(text),
    }
}

// ── Metadata index ───────────────────────────────────────────────────────────

#[tokio::test]
async fn query_sends_filters_and_bearer_token() {
    let fake = FakePlatform::default();
    fake.on_json(
        Method::GET,
        "/1/aspects",
        json!({ "items": [{
            "id": "urn:ivcap:aspect:1",
            "entity": "urn:ivcap:artifact:doc",
            "schema": RESULT_SCHEMA,
            "content": { "markdown_urn": "urn:ivcap:artifact:md" },
        }]}),
    );
    let base = fake.start().await;

    let records = client(&base, Some("jwt-123"))
        .query("urn:ivcap:artifact:doc", RESULT_SCHEMA, 1)
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].entity, "urn:ivcap:artifact:doc");
    assert_eq!(records[0].content["markdown_urn"], "urn:ivcap:artifact:md");

    let sent = fake.request(Method::GET, "/1/aspects");
    assert_eq!(sent.header("authorization"), Some("Bearer jwt-123"));
    assert_eq!(sent.query["entity"], "urn:ivcap:artifact:doc");
    assert_eq!(sent.query["schema"], RESULT_SCHEMA);
    assert_eq!(sent.query["limit"], "1");
    assert_eq!(sent.query["include-content"], "true");
}

#[tokio::test]
async fn no_token_means_no_authorization_header() {
    let fake = FakePlatform::default();
    fake.on_json(Method::GET, "/1/aspects", json!({ "items": [] }));
    let base = fake.start().await;

    let records = client(&base, None).query("e", RESULT_SCHEMA, 1).await.unwrap();

    assert!(records.is_empty());
    assert!(fake.request(Method::GET, "/1/aspects").header("authorization").is_none());
}

#[tokio::test]
async fn undecodable_body_is_decode_error() {
    let fake = FakePlatform::default();
    fake.on(Method::GET, "/1/aspects", StatusCode::OK, "<html>oops</html>");
    let base = fake.start().await;

    let err = client(&base, None).query("e", RESULT_SCHEMA, 1).await.unwrap_err();

    assert!(matches!(err, PlatformError::Decode(_)), "got {err:?}");
}

// ── Object store: resolve ────────────────────────────────────────────────────

#[tokio::test]
async fn resolve_streams_content_from_data_href() {
    let fake = FakePlatform::default();
    let base = fake.start().await;
    fake.on_json(
        Method::GET,
        "/1/artifacts/urn:ivcap:artifact:doc",
        json!({
            "id": "urn:ivcap:artifact:doc",
            "name": "report.txt",
            "mime-type": "text/plain",
            "size": 5,
            "data-href": format!("{base}/blobs/doc"),
        }),
    );
    fake.on(Method::GET, "/blobs/doc", StatusCode::OK, "hello");

    let object = client(&base, Some("jwt"))
        .resolve("urn:ivcap:artifact:doc")
        .await
        .unwrap();

    assert_eq!(object.name, "report.txt");
    assert_eq!(object.mime_type, "text/plain");
    assert_eq!(object.size, Some(5));
    assert_eq!(object.content.read_to_end().await.unwrap(), b"hello");
    assert_eq!(
        fake.request(Method::GET, "/blobs/doc").header("authorization"),
        Some("Bearer jwt")
    );
}

#[tokio::test]
async fn resolve_without_data_href_reads_blob_endpoint() {
    let fake = FakePlatform::default();
    fake.on_json(
        Method::GET,
        "/1/artifacts/urn:ivcap:artifact:doc",
        json!({ "name": "notes.md", "mime-type": "text/markdown" }),
    );
    fake.on(
        Method::GET,
        "/1/artifacts/urn:ivcap:artifact:doc/blob",
        StatusCode::OK,
        "# notes",
    );
    let base = fake.start().await;

    let object = client(&base, None)
        .resolve("urn:ivcap:artifact:doc")
        .await
        .unwrap();

    assert_eq!(object.name, "notes.md");
    assert_eq!(object.size, Some(7));
    assert_eq!(object.content.read_to_end().await.unwrap(), b"# notes");
}

#[tokio::test]
async fn error_statuses_map_to_platform_errors() {
    let fake = FakePlatform::default();
    fake.on(Method::GET, "/1/artifacts/urn:a:401", StatusCode::UNAUTHORIZED, "");
    fake.on(Method::GET, "/1/artifacts/urn:a:403", StatusCode::FORBIDDEN, "");
    fake.on(
        Method::GET,
        "/1/artifacts/urn:a:500",
        StatusCode::INTERNAL_SERVER_ERROR,
        "x".repeat(2000),
    );
    let base = fake.start().await;
    let c = client(&base, None);

    assert!(matches!(
        c.resolve("urn:a:missing").await.unwrap_err(),
        PlatformError::NotFound(ref urn) if urn == "urn:a:missing"
    ));
    assert!(matches!(
        c.resolve("urn:a:401").await.unwrap_err(),
        PlatformError::AccessDenied(_)
    ));
    assert!(matches!(
        c.resolve("urn:a:403").await.unwrap_err(),
        PlatformError::AccessDenied(_)
    ));
    match c.resolve("urn:a:500").await.unwrap_err() {
        PlatformError::Status { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message.len(), 512);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_platform_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = client(&base, None).resolve("urn:a").await.unwrap_err();

    assert!(matches!(err, PlatformError::Transport(_)), "got {err:?}");
}

// ── Object store: create ─────────────────────────────────────────────────────

#[tokio::test]
async fn create_sends_metadata_and_body() {
    let fake = FakePlatform::default();
    fake.on_json(Method::POST, "/1/artifacts", json!({ "id": "urn:ivcap:artifact:md" }));
    let base = fake.start().await;

    let urn = client(&base, Some("jwt"))
        .create(markdown_artifact("report.txt.md", "urn:ivcap:policy:team", "# hi"))
        .await
        .unwrap();

    assert_eq!(urn, "urn:ivcap:artifact:md");
    let sent = fake.request(Method::POST, "/1/artifacts");
    assert_eq!(sent.query["name"], "report.txt.md");
    assert_eq!(sent.query["policy"], "urn:ivcap:policy:team");
    assert_eq!(sent.header("content-type"), Some("text/markdown"));
    assert_eq!(sent.header("content-length"), Some("4"));
    assert_eq!(sent.header("x-name"), Some("report.txt.md"));
    assert_eq!(sent.header("x-policy"), Some("urn:ivcap:policy:team"));
    assert_eq!(sent.header("authorization"), Some("Bearer jwt"));
    assert_eq!(&sent.body[..], b"# hi");
}

#[tokio::test]
async fn non_ascii_name_and_policy_arrive_unchanged() {
    let fake = FakePlatform::default();
    fake.on_json(Method::POST, "/1/artifacts", json!({ "id": "urn:ivcap:artifact:md" }));
    let base = fake.start().await;

    client(&base, None)
        .create(markdown_artifact("Résumé.txt.md", "urn:ivcap:policy:équipe", "x"))
        .await
        .unwrap();

    let sent = fake.request(Method::POST, "/1/artifacts");
    assert_eq!(sent.query["name"], "Résumé.txt.md");
    assert_eq!(sent.query["policy"], "urn:ivcap:policy:équipe");
    assert!(sent.header("x-name").is_none());
    assert!(sent.header("x-policy").is_none());
}

#[tokio::test]
async fn rejected_upload_is_status_error() {
    let fake = FakePlatform::default();
    fake.on(Method::POST, "/1/artifacts", StatusCode::PAYLOAD_TOO_LARGE, "too big");
    let base = fake.start().await;

    let err = client(&base, None)
        .create(markdown_artifact("a.md", DEFAULT_POLICY, "a"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PlatformError::Status { status: 413, ref message } if message == "too big"
    ));
}

// ── Whole job over HTTP ──────────────────────────────────────────────────────

#[tokio::test]
async fn job_over_http_keeps_source_name() {
    let fake = FakePlatform::default();
    let base = fake.start().await;
    fake.on_json(Method::GET, "/1/aspects", json!({ "items": [] }));
    fake.on_json(
        Method::GET,
        "/1/artifacts/urn:ivcap:artifact:cv",
        json!({ "name": "Résumé.txt", "mime-type": "text/plain" }),
    );
    fake.on(
        Method::GET,
        "/1/artifacts/urn:ivcap:artifact:cv/blob",
        StatusCode::OK,
        "Bonjour",
    );
    fake.on_json(Method::POST, "/1/artifacts", json!({ "id": "urn:ivcap:artifact:cv-md" }));

    let platform = Arc::new(client(&base, None));
    let job = ConversionJob::new(
        platform.clone(),
        platform,
        Arc::new(ConverterRegistry::with_defaults()),
        DEFAULT_POLICY,
    );
    let result = job
        .convert(&ConversionRequest::new("urn:ivcap:artifact:cv"))
        .await
        .unwrap();

    assert_eq!(result.linked_entity_id, "urn:ivcap:artifact:cv");
    assert_eq!(result.markdown_urn, "urn:ivcap:artifact:cv-md");
    let upload = fake.request(Method::POST, "/1/artifacts");
    assert_eq!(upload.query["name"], "Résumé.txt.md");
    assert_eq!(upload.query["policy"], DEFAULT_POLICY);
    assert_eq!(&upload.body[..], b"Bonjour");
}
