use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::fs;
use tempfile::TempDir;
use tower::ServiceExt;

use vault_router::RouterConfig;
use vault_router_server::{build_router, AppState};

const KEY: &str = "secret-key";

fn write_vault(root: &std::path::Path) {
    fs::create_dir_all(root.join("Projects")).unwrap();
    fs::write(
        root.join("部品.md"),
        "---\ntitle: 部品\n---\n# 部品\n\n部品リスト。\n\n## 手順\n部品を取り付ける。\n",
    )
    .unwrap();
    fs::write(root.join("Projects/議事録.md"), "# 議事録\n\n部品の発注。\n").unwrap();
    fs::write(
        root.join("commands.yml"),
        "- name: minutes\n  keywords: [\"議事録\"]\n  open:\n    path: Projects/議事録.md\n",
    )
    .unwrap();
}

fn app(dir: &TempDir, api_key: Option<&str>) -> Router {
    let mut config = RouterConfig::default();
    config.vault.root = dir.path().to_path_buf();
    config.server.api_key = api_key.map(str::to_string);
    build_router(AppState::new(config).unwrap())
}

fn vault_app(api_key: Option<&str>) -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    write_vault(dir.path());
    let router = app(&dir, api_key);
    (dir, router)
}

fn enc(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

async fn get(app: Router, uri: &str, key: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().method("GET").uri(uri);
    if let Some(key) = key {
        request = request.header("X-API-Key", key);
    }
    let response = app.oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_is_public_and_uncached() {
    let (_dir, app) = vault_app(Some(KEY));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");

    let (status, body) = get(app, "/obsidian-api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "obsidian-api");
}

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let (_dir, app) = vault_app(Some(KEY));

    let (status, body) = get(app.clone(), "/files", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Invalid API key");

    let (status, _) = get(app.clone(), "/files", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = get(app, "/files", Some(KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["files"], serde_json::json!(["Projects/議事録.md", "部品.md"]));
}

#[tokio::test]
async fn test_no_key_configured_means_open_access() {
    let (_dir, app) = vault_app(None);
    let (status, _) = get(app, "/files", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_vault_is_server_error() {
    let dir = TempDir::new().unwrap();
    let mut config = RouterConfig::default();
    config.vault.root = dir.path().join("missing");
    let app = build_router(AppState::new(config).unwrap());

    let (status, body) = get(app, "/files", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], "VAULT_ROOT not found");
}

#[tokio::test]
async fn test_search_with_limit() {
    let (_dir, app) = vault_app(None);

    let (status, body) = get(app.clone(), &format!("/search?q={}", enc("部品")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["q"], "部品");
    assert_eq!(body["hits"][0]["line_no"], 0);
    assert_eq!(body["hits"][0]["path"], "部品.md");

    let (_, body) = get(app.clone(), &format!("/search?q={}&limit=2", enc("部品")), None).await;
    assert_eq!(body["hits"].as_array().unwrap().len(), 2);

    let (status, _) = get(app, "/search?q=", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_note_with_section_and_errors() {
    let (_dir, app) = vault_app(None);

    let (status, body) = get(app.clone(), &format!("/note?path={}", enc("部品.md")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["frontmatter"]["title"], "部品");
    assert!(body["text"].as_str().unwrap().starts_with("---"));

    let uri = format!("/note?path={}&section={}&with_frontmatter=false", enc("部品.md"), enc("手順"));
    let (status, body) = get(app.clone(), &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "部品を取り付ける。");
    assert!(body.get("frontmatter").is_none());

    let uri = format!("/note?path={}&section={}", enc("部品.md"), enc("なし"));
    let (status, body) = get(app.clone(), &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Section not found: なし");

    let (status, _) = get(app.clone(), "/note?path=missing.md", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(app, &format!("/note?path={}", enc("../secret.md")), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_resolve_prefers_command_table() {
    let (_dir, app) = vault_app(None);

    let (status, body) = get(app.clone(), &format!("/resolve?q={}", enc("議事録")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["found"], true);
    assert_eq!(body["source"], "command");
    assert_eq!(body["open_path"], "Projects/議事録.md");

    let (_, body) = get(app, &format!("/resolve?q={}&prefer=shortest", enc("部品")), None).await;
    assert_eq!(body["source"], "search");
    assert_eq!(body["open_path"], "部品.md");
}

#[tokio::test]
async fn test_open_builds_obsidian_urls() {
    let (_dir, app) = vault_app(None);

    let uri = format!("/open?q={}&vault={}&heading={}", enc("部品"), enc("My Vault"), enc("手順"));
    let (status, body) = get(app.clone(), &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["found"], true);
    assert_eq!(
        body["obsidian_url"],
        "obsidian://open?vault=My%20Vault&file=%E9%83%A8%E5%93%81%23%E6%89%8B%E9%A0%86"
    );
    assert_eq!(
        body["obsidian_urls"]["with_md"],
        "obsidian://open?vault=My%20Vault&file=%E9%83%A8%E5%93%81.md%23%E6%89%8B%E9%A0%86"
    );

    let uri = format!("/open?q={}&vault=V", enc("存在しない"));
    let (status, body) = get(app, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["found"], false);
    assert!(body["obsidian_url"].is_null());
    assert_eq!(body["reason"], "no hits");
}

#[tokio::test]
async fn test_assistant_executes_and_traces() {
    let (_dir, app) = vault_app(Some(KEY));

    let uri = format!("/assistant?q={}&vault=Vault", enc("部品を開いて"));
    let (status, body) = get(app, &uri, Some(KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["classification"]["intent"], "open");
    assert_eq!(body["decision"]["action"], "execute");
    assert_eq!(body["resolution"]["kind"], "executed");
    assert_eq!(body["resolution"]["success"], true);
    assert_eq!(body["resolution"]["payload"]["open_path"], "部品.md");
    assert!(body["trace"]["session_id"].as_str().is_some());
    assert_eq!(body["trace"]["steps"][0]["name"], "classify");
}

#[tokio::test]
async fn test_assistant_clarifies_unknown_input() {
    let (_dir, app) = vault_app(None);

    let uri = format!("/assistant?q={}&vault=Vault", enc("こんにちは"));
    let (status, body) = get(app, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resolution"]["kind"], "clarification");
    assert_eq!(body["resolution"]["options"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_assistant_requires_vault() {
    let (_dir, app) = vault_app(None);
    let (status, _) = get(app.clone(), "/assistant?q=x&vault=", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(app, "/assistant?q=x", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
