use actix_web::{http::StatusCode, test, web, App};
use serde_json::{json, Value};

use super::{configure, AppState};
use crate::config::Config;

fn state() -> web::Data<AppState> {
    let mut config = Config::default();
    // Nothing listens here, so explanations fail fast
    config.explain.base_url = "http://127.0.0.1:9".to_string();
    config.explain.timeout_secs = 2;
    web::Data::new(AppState::from_config(&config).unwrap())
}

macro_rules! app {
    ($max_body:expr) => {
        test::init_service(App::new().app_data(state()).configure(configure($max_body))).await
    };
}

#[actix_web::test]
async fn test_health() {
    let app = app!(65536);
    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[actix_web::test]
async fn test_run_success() {
    let app = app!(65536);
    let req = test::TestRequest::post()
        .uri("/run")
        .set_json(json!({"code": "x = 1\nx = x + 1\nprint(x)"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["output"], "2");
    assert_eq!(body["steps"][1], json!({"line_no": 2, "locals": {"x": "2"}}));
}

#[actix_web::test]
async fn test_run_compile_error() {
    let app = app!(65536);
    let req = test::TestRequest::post()
        .uri("/run")
        .set_json(json!({"code": "def f(:\n pass"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "compile_error");
    assert_eq!(body["line_no"], 1);
    assert_eq!(body["offset"], 7);
    assert_eq!(body["steps"], json!([]));
}

#[actix_web::test]
async fn test_run_runtime_error() {
    let app = app!(65536);
    let req = test::TestRequest::post()
        .uri("/run")
        .set_json(json!({"code": "x = 1\nraise ValueError(\"boom\")"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "runtime_error");
    assert_eq!(body["error_type"], "ValueError");
    assert_eq!(body["steps"].as_array().map(Vec::len), Some(1));
}

#[actix_web::test]
async fn test_run_rejects_missing_code() {
    let app = app!(65536);
    let req = test::TestRequest::post()
        .uri("/run")
        .set_json(json!({"source": "x = 1"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
}

#[actix_web::test]
async fn test_run_rejects_oversized_body() {
    let app = app!(64);
    let req = test::TestRequest::post()
        .uri("/run")
        .set_json(json!({"code": "x = 1\n".repeat(100)}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[actix_web::test]
async fn test_explain_failure_is_bad_gateway() {
    let app = app!(65536);
    let req = test::TestRequest::post()
        .uri("/explain")
        .set_json(json!({"code": "x = 1", "step": {"line_no": 1, "locals": {"x": "1"}}}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"]
        .as_str()
        .is_some_and(|e| e.starts_with("explanation request failed")));
}
