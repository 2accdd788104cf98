mod common;

use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;

use common::{entry_count, pipeline, FakeBackend, Workspace, TWO_EMPLOYEES};
use salary_slip_server::config::DeliveryMode;
use salary_slip_server::handlers;
use salary_slip_server::render::{MarkupBackend, RenderBackend};
use salary_slip_server::AppState;

const BOUNDARY: &str = "slip-test-boundary";

fn multipart_body(field: &str, filename: &str, contents: &str) -> String {
    format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n\
         {contents}\r\n\
         --{BOUNDARY}--\r\n"
    )
}

fn upload_request(field: &str, filename: &str, contents: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/generate")
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(multipart_body(field, filename, contents))
}

fn app_state(ws: &Workspace, delivery: DeliveryMode, backend: Arc<dyn RenderBackend>) -> AppState {
    AppState::new(pipeline(ws.config(delivery), backend), ws.upload_dir(), 1024)
}

macro_rules! slip_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .service(web::scope("/api").configure(handlers::config))
                .route("/health", web::get().to(handlers::health)),
        )
        .await
    };
}

#[actix_web::test]
async fn test_generate_combined_returns_html() {
    let ws = Workspace::new();
    let app = slip_app!(app_state(&ws, DeliveryMode::Combined, Arc::new(MarkupBackend)));

    let resp = test::call_service(&app, upload_request("file", "payroll.csv", TWO_EMPLOYEES).to_request()).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let body = test::read_body(resp).await;
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("Alice") && html.contains("Bob"));
    assert!(html.contains("Net: 950") && html.contains("Net: 1900"));
    assert_eq!(entry_count(&ws.upload_dir()), 0);
}

#[actix_web::test]
async fn test_generate_archive_streams_zip_attachment() {
    let ws = Workspace::new();
    let app = slip_app!(app_state(&ws, DeliveryMode::Archive, Arc::new(MarkupBackend)));

    let resp = test::call_service(&app, upload_request("file", "payroll.csv", TWO_EMPLOYEES).to_request()).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "application/zip");
    let disposition = resp
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains("salary-slips.zip"));

    let body = test::read_body(resp).await;
    let mut archive = zip::ZipArchive::new(Cursor::new(body.to_vec())).unwrap();
    assert_eq!(archive.len(), 2);
    assert!(archive.by_name("E1.html").is_ok());
    assert!(archive.by_name("E2.html").is_ok());

    assert_eq!(entry_count(&ws.output_dir()), 0);
    assert_eq!(entry_count(&ws.upload_dir()), 0);
}

#[actix_web::test]
async fn test_generate_indexed_links_each_slip() {
    let ws = Workspace::new();
    let app = slip_app!(app_state(&ws, DeliveryMode::Indexed, Arc::new(MarkupBackend)));

    let resp = test::call_service(&app, upload_request("file", "payroll.csv", TWO_EMPLOYEES).to_request()).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("2 slip(s) generated."));
    assert!(html.contains("/E1.html") && html.contains("/E2.html"));
    assert_eq!(entry_count(&ws.output_dir()), 1);
}

#[actix_web::test]
async fn test_unsupported_extension_is_rejected() {
    let ws = Workspace::new();
    let app = slip_app!(app_state(&ws, DeliveryMode::Combined, Arc::new(MarkupBackend)));

    let resp = test::call_service(&app, upload_request("file", "payroll.pdf", "%PDF-1.7").to_request()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Unsupported file format");
    assert_eq!(entry_count(&ws.upload_dir()), 0);
}

#[actix_web::test]
async fn test_missing_file_field_is_rejected() {
    let ws = Workspace::new();
    let app = slip_app!(app_state(&ws, DeliveryMode::Combined, Arc::new(MarkupBackend)));

    let resp =
        test::call_service(&app, upload_request("attachment", "payroll.csv", TWO_EMPLOYEES).to_request()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "No file uploaded");
}

#[actix_web::test]
async fn test_header_only_upload_is_empty_batch() {
    let ws = Workspace::new();
    let app = slip_app!(app_state(&ws, DeliveryMode::Combined, Arc::new(MarkupBackend)));

    let resp = test::call_service(&app, upload_request("file", "payroll.csv", "name,code\n").to_request()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "No data found in file");
    assert_eq!(entry_count(&ws.upload_dir()), 0);
}

#[actix_web::test]
async fn test_oversized_upload_is_invalid_input() {
    let ws = Workspace::new();
    let app = slip_app!(app_state(&ws, DeliveryMode::Combined, Arc::new(MarkupBackend)));
    let big = format!("name,code\n{}", "Alice,E1\n".repeat(200));

    let resp = test::call_service(&app, upload_request("file", "payroll.csv", &big).to_request()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body["error"],
        "Invalid file format. Please ensure it's a valid Excel or CSV file."
    );
    assert_eq!(entry_count(&ws.upload_dir()), 0);
}

#[actix_web::test]
async fn test_render_failure_is_server_error() {
    let ws = Workspace::new();
    let backend = Arc::new(FakeBackend::failing_at(1));
    let app = slip_app!(app_state(&ws, DeliveryMode::Archive, backend.clone()));

    let resp = test::call_service(&app, upload_request("file", "payroll.csv", TWO_EMPLOYEES).to_request()).await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Server error during processing");
    assert_eq!(backend.closes(), 1);
    assert_eq!(entry_count(&ws.output_dir()), 0);
    assert_eq!(entry_count(&ws.upload_dir()), 0);
}

#[actix_web::test]
async fn test_health_reports_modes() {
    let ws = Workspace::new();
    let app = slip_app!(app_state(&ws, DeliveryMode::Archive, Arc::new(MarkupBackend)));

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["status"], "ok");
    assert_eq!(body["delivery"], "archive");
    assert_eq!(body["strategy"], "markup");
}
