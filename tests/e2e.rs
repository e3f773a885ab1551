//! End-to-end tests for xlsform-gateway.
//!
//! Each test starts the real router on `127.0.0.1:0` and talks to it over
//! HTTP with `reqwest`. The converter is a stub so these run anywhere; the
//! tests at the bottom call the real `xls2xform` and are gated behind the
//! `E2E_ENABLED` environment variable.
//!
//! Run the live tests with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use xlsform_gateway::{
    prepare_output, server, ConversionService, ConvertedForm, ConverterError, LocalStore,
    ServiceConfig, XformConverter,
};

// ── Test helpers ─────────────────────────────────────────────────────────────

const XFORM: &str = "<?xml version=\"1.0\"?>\n<h:html xmlns:h=\"http://www.w3.org/1999/xhtml\"/>\n";

/// Writes [`XFORM`] for any source, unless the source contains "corrupt".
/// Records the staged paths it saw and the outputs it produced.
#[derive(Default)]
struct StubConverter {
    sources: Mutex<Vec<PathBuf>>,
    outputs: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl XformConverter for StubConverter {
    async fn convert(&self, source: &Path) -> Result<ConvertedForm, ConverterError> {
        self.sources.lock().unwrap().push(source.to_path_buf());
        let content = tokio::fs::read(source).await.unwrap_or_default();
        if content.windows(7).any(|w| w == b"corrupt") {
            return Err(ConverterError::Rejected {
                message: "The first sheet must be named 'survey'.".into(),
            });
        }
        let (dir, path) = prepare_output(source)?;
        tokio::fs::write(&path, XFORM).await.unwrap();
        self.outputs.lock().unwrap().push(path.clone());
        Ok(ConvertedForm::new(dir, path))
    }
}

struct TestServer {
    base: String,
    uploads: PathBuf,
    _root: TempDir,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

async fn spawn_server(
    converter: Option<Arc<dyn XformConverter>>,
    max_upload_bytes: usize,
) -> TestServer {
    let root = tempfile::tempdir().unwrap();
    let uploads = root.path().join("uploads");
    let config = ServiceConfig::builder()
        .upload_dir(&uploads)
        .max_upload_bytes(max_upload_bytes)
        .build()
        .unwrap();

    let service = match converter {
        Some(c) => ConversionService::new(&config, Arc::new(LocalStore::new()), c)
            .await
            .unwrap(),
        None => ConversionService::from_config(&config).await.unwrap(),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::router(Arc::new(service), config.max_upload_bytes);
    tokio::spawn(server::serve(listener, app, std::future::pending()));

    TestServer {
        base: format!("http://{addr}"),
        uploads,
        _root: root,
    }
}

async fn spawn_stub_server() -> (TestServer, Arc<StubConverter>) {
    let stub = Arc::new(StubConverter::default());
    let server = spawn_server(Some(stub.clone()), 10 * 1024 * 1024).await;
    (server, stub)
}

/// Filenames are sent verbatim, as a browser would, so traversal attempts
/// reach the server intact.
fn file_form(name: &str, content: &[u8]) -> Form {
    Form::new()
        .percent_encode_noop()
        .part("file", Part::bytes(content.to_vec()).file_name(name.to_string()))
}

async fn post_file(server: &TestServer, name: &str, content: &[u8]) -> reqwest::Response {
    reqwest::Client::new()
        .post(server.url("/xls/to/xform"))
        .multipart(file_form(name, content))
        .send()
        .await
        .unwrap()
}

fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(true)
}

async fn detail(resp: reqwest::Response) -> String {
    let body: serde_json::Value = resp.json().await.unwrap();
    body["detail"].as_str().unwrap_or_default().to_string()
}

/// Poll until `cond` holds, for up to one second.
async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..50 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}

// ── Conversion endpoint ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_valid_upload_returns_named_xml_attachment() {
    let (server, stub) = spawn_stub_server().await;

    let resp = post_file(&server, "survey.xlsx", b"type,name,label").await;

    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers().clone();
    assert_eq!(headers["content-type"], "application/xml");
    assert_eq!(
        headers["content-disposition"],
        "attachment; filename=\"survey.xml\""
    );
    assert_eq!(resp.text().await.unwrap(), XFORM);

    let staged = stub.sources.lock().unwrap()[0].clone();
    assert!(staged.starts_with(&server.uploads));
    assert!(!staged.exists(), "staged upload must be gone after the response");
    assert!(dir_is_empty(&server.uploads));
}

#[tokio::test]
async fn test_converted_output_removed_after_response() {
    let (server, stub) = spawn_stub_server().await;

    let resp = post_file(&server, "survey.xlsx", b"x").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let _ = resp.bytes().await.unwrap();

    let output = stub.outputs.lock().unwrap()[0].clone();
    let output_dir = output.parent().unwrap().to_path_buf();
    assert!(
        eventually(|| !output_dir.exists()).await,
        "converter output dir survived the response: {}",
        output_dir.display()
    );
}

#[tokio::test]
async fn test_corrupt_upload_returns_uniform_500() {
    let (server, stub) = spawn_stub_server().await;

    let resp = post_file(&server, "bad.xlsx", b"corrupt bytes").await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        detail(resp).await,
        "Failed to convert XLS to XForm: The first sheet must be named 'survey'."
    );
    assert!(!stub.sources.lock().unwrap()[0].exists());
    assert!(dir_is_empty(&server.uploads));
}

#[tokio::test]
async fn test_missing_upload_dir_is_recreated() {
    let (server, _stub) = spawn_stub_server().await;
    std::fs::remove_dir_all(&server.uploads).unwrap();

    let resp = post_file(&server, "survey.xlsx", b"x").await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(server.uploads.is_dir());
}

#[tokio::test]
async fn test_concurrent_same_name_uploads_both_succeed() {
    let (server, stub) = spawn_stub_server().await;

    let (a, b) = tokio::join!(
        post_file(&server, "survey.xlsx", b"first"),
        post_file(&server, "survey.xlsx", b"second"),
    );

    assert_eq!(a.status(), StatusCode::OK);
    assert_eq!(b.status(), StatusCode::OK);
    let sources = stub.sources.lock().unwrap().clone();
    assert_eq!(sources.len(), 2);
    assert_ne!(sources[0], sources[1]);
    assert!(dir_is_empty(&server.uploads));
}

#[tokio::test]
async fn test_traversal_filename_stays_in_upload_dir() {
    let (server, stub) = spawn_stub_server().await;

    let resp = post_file(&server, "../../escape.xlsx", b"x").await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["content-disposition"],
        "attachment; filename=\"escape.xml\""
    );
    let staged = stub.sources.lock().unwrap()[0].clone();
    assert!(staged.starts_with(&server.uploads));
    assert!(!server.uploads.parent().unwrap().join("escape.xlsx").exists());
}

#[tokio::test]
async fn test_unusable_filename_is_uniform_500() {
    let (server, stub) = spawn_stub_server().await;

    let resp = post_file(&server, "..", b"x").await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(detail(resp)
        .await
        .starts_with("Failed to convert XLS to XForm: "));
    assert!(stub.sources.lock().unwrap().is_empty());
}

// ── Request validation ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_file_field_is_400() {
    let (server, stub) = spawn_stub_server().await;

    let form = Form::new().text("comment", "no file here");
    let resp = reqwest::Client::new()
        .post(server.url("/xls/to/xform"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(detail(resp).await.contains("file"));
    assert!(stub.sources.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_file_field_is_400() {
    let (server, stub) = spawn_stub_server().await;

    let form = file_form("a.xlsx", b"a").part("file", Part::bytes(b"b".to_vec()).file_name("b.xlsx"));
    let resp = reqwest::Client::new()
        .post(server.url("/xls/to/xform"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(stub.sources.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_non_multipart_body_is_400() {
    let (server, _stub) = spawn_stub_server().await;

    let resp = reqwest::Client::new()
        .post(server.url("/xls/to/xform"))
        .body("just text")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_upload_is_413() {
    let stub = Arc::new(StubConverter::default());
    let server = spawn_server(Some(stub.clone()), 2048).await;

    let resp = post_file(&server, "survey.xlsx", &[b'x'; 8192]).await;

    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(stub.sources.lock().unwrap().is_empty());
}

// ── Landing page ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_landing_page_has_upload_form() {
    let (server, _stub) = spawn_stub_server().await;

    let resp = reqwest::get(server.url("/")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let html = resp.text().await.unwrap();
    assert!(html.contains("action=\"/xls/to/xform\""));
    assert!(html.contains("name=\"file\""));
}

// ── Live pyxform tests (E2E_ENABLED) ─────────────────────────────────────────

/// A minimal XLSForm: one text question, written as a real .xlsx.
fn write_survey_workbook(path: &Path) {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet().set_name("survey").unwrap();
    for (col, header) in ["type", "name", "label"].iter().enumerate() {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    for (col, value) in ["text", "respondent", "What is your name?"].iter().enumerate() {
        sheet.write_string(1, col as u16, *value).unwrap();
    }
    workbook.save(path).unwrap();
}

#[tokio::test]
async fn test_live_pyxform_converts_workbook() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP — set E2E_ENABLED=1 (and install pyxform) to run");
        return;
    }
    let server = spawn_server(None, 10 * 1024 * 1024).await;
    let scratch = tempfile::tempdir().unwrap();
    let xlsx = scratch.path().join("survey.xlsx");
    write_survey_workbook(&xlsx);

    let resp = post_file(&server, "survey.xlsx", &std::fs::read(&xlsx).unwrap()).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["content-disposition"],
        "attachment; filename=\"survey.xml\""
    );
    let xml = resp.text().await.unwrap();
    assert!(xml.contains("<h:html"), "not an XForm:\n{xml}");
    assert!(xml.contains("respondent"));
    assert!(dir_is_empty(&server.uploads));
}

#[tokio::test]
async fn test_live_pyxform_rejects_garbage() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP — set E2E_ENABLED=1 (and install pyxform) to run");
        return;
    }
    let server = spawn_server(None, 10 * 1024 * 1024).await;

    let resp = post_file(&server, "bad.xlsx", b"this is not a spreadsheet").await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let detail = detail(resp).await;
    assert!(detail.starts_with("Failed to convert XLS to XForm: "), "{detail}");
    assert!(dir_is_empty(&server.uploads));
}
