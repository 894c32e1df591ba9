mod common;

use chrono::Duration;

use common::{Harness, TAX_ID_A};
use kontu_identity::models::Password;
use kontu_identity::utils::errors::{AuthErrorKind, IdentityError, TokenErrorKind, ValidationKind};

fn pw(value: &str) -> Password {
    Password::from(value)
}

#[tokio::test]
async fn test_reset_flow_replaces_the_password() {
    let h = Harness::new().await;
    h.tenant(TAX_ID_A, "ana@padaria.com").await;
    let ctx = h.service.context();

    let issued = h.service.request_password_reset(&ctx, " Ana@Padaria.com ").await.unwrap();
    assert_eq!(issued.expires_at, common::t0() + Duration::minutes(60));

    let delivered = h.notifier.last_token_for("ana@padaria.com").unwrap();
    assert_eq!(delivered, issued);

    let verdict = h.service.validate_reset_token(&ctx, &issued.value).await.unwrap();
    assert!(verdict.is_valid);
    assert_eq!(verdict.email.as_deref(), Some("ana@padaria.com"));

    h.service
        .reset_password(&ctx, &issued.value, pw("novasenha"), pw("novasenha"))
        .await
        .unwrap();

    let err = h
        .service
        .login(&ctx, "ana@padaria.com", &pw("segredo123"))
        .await
        .unwrap_err();
    assert_eq!(err, IdentityError::Auth(AuthErrorKind::InvalidCredentials));
    h.service.login(&ctx, "ana@padaria.com", &pw("novasenha")).await.unwrap();

    // El token queda invalidado tras el uso
    let err = h
        .service
        .reset_password(&ctx, &issued.value, pw("otrasenha"), pw("otrasenha"))
        .await
        .unwrap_err();
    assert_eq!(err, IdentityError::Token(TokenErrorKind::NotFound));
}

#[tokio::test]
async fn test_reset_token_window() {
    let h = Harness::new().await;
    h.tenant(TAX_ID_A, "ana@padaria.com").await;
    let ctx = h.service.context();

    let issued = h.service.request_password_reset(&ctx, "ana@padaria.com").await.unwrap();

    h.clock.advance(Duration::minutes(59));
    assert!(h.service.validate_reset_token(&ctx, &issued.value).await.unwrap().is_valid);

    h.clock.advance(Duration::minutes(2));
    let verdict = h.service.validate_reset_token(&ctx, &issued.value).await.unwrap();
    assert_eq!(verdict.reason, Some(TokenErrorKind::Expired));

    let err = h
        .service
        .reset_password(&ctx, &issued.value, pw("novasenha"), pw("novasenha"))
        .await
        .unwrap_err();
    assert_eq!(err, IdentityError::Token(TokenErrorKind::Expired));
    h.service.login(&ctx, "ana@padaria.com", &pw("segredo123")).await.unwrap();
}

#[tokio::test]
async fn test_reissue_supersedes_previous_token() {
    let h = Harness::new().await;
    h.tenant(TAX_ID_A, "ana@padaria.com").await;
    let ctx = h.service.context();

    let first = h.service.request_password_reset(&ctx, "ana@padaria.com").await.unwrap();
    let second = h.service.request_password_reset(&ctx, "ana@padaria.com").await.unwrap();
    assert_ne!(first.value, second.value);

    let err = h
        .service
        .reset_password(&ctx, &first.value, pw("novasenha"), pw("novasenha"))
        .await
        .unwrap_err();
    assert_eq!(err, IdentityError::Token(TokenErrorKind::NotFound));

    h.service
        .reset_password(&ctx, &second.value, pw("novasenha"), pw("novasenha"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unknown_email_is_not_found() {
    let h = Harness::new().await;
    let ctx = h.service.context();

    let err = h
        .service
        .request_password_reset(&ctx, "ninguem@padaria.com")
        .await
        .unwrap_err();
    assert_eq!(err, IdentityError::Token(TokenErrorKind::NotFound));
    assert!(h.notifier.last_token_for("ninguem@padaria.com").is_none());
}

#[tokio::test]
async fn test_new_password_rules_are_checked_first() {
    let h = Harness::new().await;
    h.tenant(TAX_ID_A, "ana@padaria.com").await;
    let ctx = h.service.context();
    let issued = h.service.request_password_reset(&ctx, "ana@padaria.com").await.unwrap();

    let err = h
        .service
        .reset_password(&ctx, &issued.value, pw("abc"), pw("abc"))
        .await
        .unwrap_err();
    assert_eq!(err, IdentityError::Validation(ValidationKind::PasswordTooShort));

    let err = h
        .service
        .reset_password(&ctx, &issued.value, pw("novasenha"), pw("novasenhA"))
        .await
        .unwrap_err();
    assert_eq!(err, IdentityError::Validation(ValidationKind::PasswordMismatch));

    // El token sigue vigente
    assert!(h.service.validate_reset_token(&ctx, &issued.value).await.unwrap().is_valid);
}
