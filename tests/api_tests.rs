mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{Harness, TAX_ID_A};
use kontu_identity::config::{EnvironmentConfig, IdentityBackend};
use kontu_identity::routes::create_router;
use kontu_identity::state::AppState;

fn test_config() -> EnvironmentConfig {
    EnvironmentConfig {
        environment: "development".to_string(),
        port: 3000,
        host: "127.0.0.1".to_string(),
        jwt_secret: "test-secret".to_string(),
        jwt_expiration: 3600,
        cors_origins: vec![],
        log_level: "debug".to_string(),
        backend: IdentityBackend::Memory,
        database_url: None,
        data_service_url: None,
        data_service_key: None,
    }
}

fn create_test_app(h: &Harness) -> Router {
    create_router(AppState::new(h.service.clone(), test_config()))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>, bearer: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn registration_body(tax_id: &str, admin_email: &str) -> Value {
    json!({
        "company": {
            "trade_name": "Padaria Central",
            "email": "contato@padaria.com",
            "phone": "(11) 3333-4444",
            "cnpj": tax_id,
            "address": "Av. Paulista, 1000",
            "neighborhood": "Bela Vista",
            "zip_code": "01310-100",
            "city": "São Paulo",
            "state": "sp"
        },
        "admin": {
            "name": "Ana Souza",
            "email": admin_email,
            "password": "segredo123",
            "confirmPassword": "segredo123"
        }
    })
}

async fn login_token(app: &Router, email: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/login",
        Some(json!({ "email": email, "password": password })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_connectivity_endpoint() {
    let h = Harness::new().await;
    let app = create_test_app(&h);

    let (status, body) = send(&app, Method::GET, "/api/health/connectivity", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reachable"], true);

    h.store.set_reachable(false);
    let (status, body) = send(&app, Method::GET, "/api/health/connectivity", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["data"]["reachable"], false);
}

#[tokio::test]
async fn test_register_company_and_duplicate() {
    let h = Harness::new().await;
    let app = create_test_app(&h);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/registration/company",
        Some(registration_body(TAX_ID_A, "ana@padaria.com")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["path"], "atomic");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/registration/company",
        Some(registration_body(TAX_ID_A, "bruno@padaria.com")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "VALIDATION_DUPLICATE_TAX_ID");
}

#[tokio::test]
async fn test_invalid_registration_is_bad_request() {
    let h = Harness::new().await;
    let app = create_test_app(&h);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/registration/company",
        Some(registration_body("11.222.333/0001-00", "ana@padaria.com")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_MALFORMED_TAX_ID");
}

#[tokio::test]
async fn test_login_and_invitation_flow() {
    let h = Harness::new().await;
    h.tenant(TAX_ID_A, "ana@padaria.com").await;
    let app = create_test_app(&h);

    let (status, _) = send(&app, Method::POST, "/api/invitations", Some(json!({})), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = login_token(&app, "ana@padaria.com", "segredo123").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/invitations",
        Some(json!({ "email": "caio@padaria.com" })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let invitation = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::GET, &format!("/api/invitations/{}", invitation), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_valid"], true);
    assert_eq!(body["data"]["email"], "caio@padaria.com");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/registration/collaborator",
        Some(json!({
            "token": invitation,
            "name": "Caio",
            "email": "caio@padaria.com",
            "password": "senha123",
            "confirm_password": "senha123"
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["data"]["user_id"].is_string());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/registration/collaborator",
        Some(json!({
            "token": invitation,
            "name": "Caio",
            "email": "caio2@padaria.com",
            "password": "senha123",
            "confirm_password": "senha123"
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "TOKEN_ALREADY_USED");

    // Un colaborador no puede invitar
    let collaborator = login_token(&app, "caio@padaria.com", "senha123").await;
    let (status, _) = send(&app, Method::POST, "/api/invitations", Some(json!({})), Some(&collaborator)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_bad_credentials_and_me() {
    let h = Harness::new().await;
    let tenant = h.tenant(TAX_ID_A, "ana@padaria.com").await;
    let app = create_test_app(&h);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        Some(json!({ "email": "ana@padaria.com", "password": "errada" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTH_INVALID_CREDENTIALS");

    let token = login_token(&app, "ana@padaria.com", "segredo123").await;
    let (status, body) = send(&app, Method::GET, "/api/auth/me", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["session"]["user_id"], tenant.admin_id.to_string());

    let (status, _) = send(&app, Method::GET, "/api/auth/me", None, Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    h.store.set_user_active(tenant.admin_id, false).await;
    let (status, body) = send(&app, Method::GET, "/api/auth/me", None, Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "AUTH_INACTIVE");
}

#[tokio::test]
async fn test_password_reset_endpoints() {
    let h = Harness::new().await;
    h.tenant(TAX_ID_A, "ana@padaria.com").await;
    let app = create_test_app(&h);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/password/forgot",
        Some(json!({ "email": "ana@padaria.com" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["expires_at"].is_string());
    assert!(body["data"].get("token").is_none());

    let issued = h.notifier.last_token_for("ana@padaria.com").unwrap();

    let (status, body) = send(&app, Method::GET, &format!("/api/password/reset/{}", issued.value), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_valid"], true);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/password/reset",
        Some(json!({
            "token": issued.value,
            "password": "novasenha",
            "confirm_password": "novasenha"
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    login_token(&app, "ana@padaria.com", "novasenha").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/password/forgot",
        Some(json!({ "email": "ninguem@padaria.com" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TOKEN_NOT_FOUND");
}

#[tokio::test]
async fn test_offline_requests_are_service_unavailable() {
    let h = Harness::new().await;
    let app = create_test_app(&h);

    h.store.set_reachable(false);
    h.service.check_connectivity().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        Some(json!({ "email": "ana@padaria.com", "password": "segredo123" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "CONNECTIVITY_ERROR");
}
