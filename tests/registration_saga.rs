mod common;

use std::time::Duration;

use common::{account, company, Harness, TAX_ID_A, TAX_ID_B};
use kontu_identity::config::{FallbackPolicy, IdentityConfig};
use kontu_identity::repositories::{StoreError, StoreOperation, UniqueField};
use kontu_identity::services::RegistrationPath;
use kontu_identity::utils::deadline::CallContext;
use kontu_identity::utils::errors::{IdentityError, ValidationKind};

fn denied() -> StoreError {
    StoreError::PermissionDenied("permission denied for function register_company_and_admin".to_string())
}

#[tokio::test]
async fn test_atomic_registration_creates_company_and_admin() {
    let h = Harness::new().await;
    let ctx = h.service.context();

    let outcome = h
        .service
        .register_company_and_admin(
            &ctx,
            company(TAX_ID_A, "contato@padaria.com"),
            account("Ana Souza", "Ana@Padaria.com", "segredo123"),
        )
        .await
        .unwrap();

    assert_eq!(outcome.path, RegistrationPath::Atomic);
    assert_eq!(h.store.companies_with_tax_id("11222333000181").await, 1);
    assert_eq!(h.store.admins_of(outcome.company_id).await, 1);

    let admin = h.store.user_by_email("ana@padaria.com").await.unwrap();
    assert_eq!(admin.id, outcome.admin_id);
    assert!(admin.is_active);
}

#[tokio::test]
async fn test_duplicate_tax_id_is_rejected() {
    let h = Harness::new().await;
    h.tenant(TAX_ID_A, "ana@padaria.com").await;

    let ctx = h.service.context();
    let err = h
        .service
        .register_company_and_admin(
            &ctx,
            company("11222333000181", "outra@padaria.com"),
            account("Bruno", "bruno@padaria.com", "segredo123"),
        )
        .await
        .unwrap_err();

    assert_eq!(err, IdentityError::Validation(ValidationKind::DuplicateTaxId));
    assert_eq!(h.store.company_count().await, 1);
    assert!(h.store.user_by_email("bruno@padaria.com").await.is_none());
}

#[tokio::test]
async fn test_invalid_input_never_reaches_the_store() {
    let h = Harness::new().await;
    let ctx = h.service.context();

    let err = h
        .service
        .register_company_and_admin(
            &ctx,
            company("11.222.333/0001-82", "contato@padaria.com"),
            account("Ana", "ana@padaria.com", "segredo123"),
        )
        .await
        .unwrap_err();
    assert_eq!(err, IdentityError::Validation(ValidationKind::MalformedTaxId));

    let mut bad_cep = company(TAX_ID_A, "contato@padaria.com");
    bad_cep.zip_code = "0131-100".to_string();
    let err = h
        .service
        .register_company_and_admin(&ctx, bad_cep, account("Ana", "ana@padaria.com", "segredo123"))
        .await
        .unwrap_err();
    assert_eq!(err, IdentityError::Validation(ValidationKind::MalformedPostalCode));

    let mut mismatch = account("Ana", "ana@padaria.com", "segredo123");
    mismatch.confirm_password = "segredo124".into();
    let err = h
        .service
        .register_company_and_admin(&ctx, company(TAX_ID_A, "contato@padaria.com"), mismatch)
        .await
        .unwrap_err();
    assert_eq!(err, IdentityError::Validation(ValidationKind::PasswordMismatch));

    let err = h
        .service
        .register_company_and_admin(
            &ctx,
            company(TAX_ID_A, "contato@padaria.com"),
            account("Ana", "ana@padaria.com", "12345"),
        )
        .await
        .unwrap_err();
    assert_eq!(err, IdentityError::Validation(ValidationKind::PasswordTooShort));

    assert_eq!(h.store.call_count(StoreOperation::AtomicProcedure), 0);
    assert_eq!(h.store.company_count().await, 0);
}

#[tokio::test]
async fn test_permission_denied_falls_back_to_direct_inserts() {
    let h = Harness::new().await;
    h.store.fail_next(StoreOperation::AtomicProcedure, denied());

    let ctx = h.service.context();
    let outcome = h
        .service
        .register_company_and_admin(
            &ctx,
            company(TAX_ID_A, "contato@padaria.com"),
            account("Ana", "ana@padaria.com", "segredo123"),
        )
        .await
        .unwrap();

    assert_eq!(outcome.path, RegistrationPath::Fallback);
    assert_eq!(h.store.call_count(StoreOperation::InsertCompany), 1);
    assert_eq!(h.store.call_count(StoreOperation::InsertUser), 1);
    assert_eq!(h.store.admins_of(outcome.company_id).await, 1);

    // El admin creado por el fallback puede autenticarse
    let session = h
        .service
        .login(&ctx, "ana@padaria.com", &"segredo123".into())
        .await
        .unwrap();
    assert_eq!(session.company_id, Some(outcome.company_id));
}

#[tokio::test]
async fn test_backend_failure_only_falls_back_when_configured() {
    let h = Harness::new().await;
    h.store
        .fail_next(StoreOperation::AtomicProcedure, StoreError::Backend("function missing".into()));

    let ctx = h.service.context();
    let err = h
        .service
        .register_company_and_admin(
            &ctx,
            company(TAX_ID_A, "contato@padaria.com"),
            account("Ana", "ana@padaria.com", "segredo123"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::Persistence(_)));
    assert_eq!(h.store.call_count(StoreOperation::InsertCompany), 0);

    let h = Harness::with_config(IdentityConfig {
        fallback_policy: FallbackPolicy::AnyRemoteFailure,
        ..IdentityConfig::for_tests()
    })
    .await;
    h.store
        .fail_next(StoreOperation::AtomicProcedure, StoreError::Backend("function missing".into()));

    let outcome = h
        .service
        .register_company_and_admin(
            &ctx,
            company(TAX_ID_A, "contato@padaria.com"),
            account("Ana", "ana@padaria.com", "segredo123"),
        )
        .await
        .unwrap();
    assert_eq!(outcome.path, RegistrationPath::Fallback);
}

#[tokio::test]
async fn test_pre_check_reports_duplicates_before_writing() {
    let h = Harness::new().await;
    h.tenant(TAX_ID_A, "ana@padaria.com").await;
    h.store.fail_next(StoreOperation::AtomicProcedure, denied());

    let ctx = h.service.context();
    let err = h
        .service
        .register_company_and_admin(
            &ctx,
            company(TAX_ID_B, "nova@empresa.com"),
            account("Ana de novo", "ana@padaria.com", "segredo123"),
        )
        .await
        .unwrap_err();

    assert_eq!(err, IdentityError::Validation(ValidationKind::DuplicateUserEmail));
    assert_eq!(h.store.call_count(StoreOperation::InsertCompany), 0);
    assert_eq!(h.store.companies_with_tax_id("12345678000195").await, 0);
}

#[tokio::test]
async fn test_failed_admin_insert_is_compensated() {
    let h = Harness::new().await;
    h.store.fail_next(StoreOperation::AtomicProcedure, denied());
    h.store
        .fail_next(StoreOperation::InsertUser, StoreError::Duplicate(UniqueField::UserEmail));

    let ctx = h.service.context();
    let err = h
        .service
        .register_company_and_admin(
            &ctx,
            company(TAX_ID_A, "contato@padaria.com"),
            account("Ana", "ana@padaria.com", "segredo123"),
        )
        .await
        .unwrap_err();

    assert_eq!(err, IdentityError::Validation(ValidationKind::DuplicateUserEmail));
    assert_eq!(h.store.call_count(StoreOperation::DeleteCompany), 1);
    assert_eq!(h.store.companies_with_tax_id("11222333000181").await, 0);
}

#[tokio::test]
async fn test_failed_compensation_surfaces_the_orphan() {
    let h = Harness::new().await;
    h.store.fail_next(StoreOperation::AtomicProcedure, denied());
    h.store.fail_next(StoreOperation::InsertUser, StoreError::Backend("boom".into()));
    h.store
        .fail_next(StoreOperation::DeleteCompany, StoreError::Backend("delete failed".into()));

    let ctx = h.service.context();
    let err = h
        .service
        .register_company_and_admin(
            &ctx,
            company(TAX_ID_A, "contato@padaria.com"),
            account("Ana", "ana@padaria.com", "segredo123"),
        )
        .await
        .unwrap_err();

    match err {
        IdentityError::Persistence(msg) => assert!(msg.contains("11222333000181")),
        other => panic!("expected persistence error, got {:?}", other),
    }
    assert_eq!(h.store.companies_with_tax_id("11222333000181").await, 1);
}

#[tokio::test]
async fn test_denied_compensation_is_a_permission_error() {
    let h = Harness::new().await;
    h.store.fail_next(StoreOperation::AtomicProcedure, denied());
    h.store.fail_next(StoreOperation::InsertUser, StoreError::Backend("boom".into()));
    h.store
        .fail_next(StoreOperation::DeleteCompany, StoreError::PermissionDenied("rls".into()));

    let ctx = h.service.context();
    let err = h
        .service
        .register_company_and_admin(
            &ctx,
            company(TAX_ID_A, "contato@padaria.com"),
            account("Ana", "ana@padaria.com", "segredo123"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, IdentityError::Permission(_)));
}

#[tokio::test]
async fn test_unreachable_gate_fails_fast() {
    let h = Harness::new().await;
    h.store.set_reachable(false);
    assert!(!h.service.check_connectivity().await);

    let ctx = h.service.context();
    let err = h
        .service
        .register_company_and_admin(
            &ctx,
            company(TAX_ID_A, "contato@padaria.com"),
            account("Ana", "ana@padaria.com", "segredo123"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, IdentityError::Connectivity(_)));
    assert_eq!(h.store.call_count(StoreOperation::AtomicProcedure), 0);

    // Recupera solo tras un nuevo sondeo
    h.store.set_reachable(true);
    assert!(h.service.check_connectivity().await);
    h.service
        .register_company_and_admin(
            &ctx,
            company(TAX_ID_A, "contato@padaria.com"),
            account("Ana", "ana@padaria.com", "segredo123"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_concurrent_registrations_of_same_tax_id() {
    let h = Harness::new().await;

    let first = {
        let service = h.service.clone();
        tokio::spawn(async move {
            let ctx = service.context();
            service
                .register_company_and_admin(
                    &ctx,
                    company(TAX_ID_A, "um@padaria.com"),
                    account("Um", "um@padaria.com", "segredo123"),
                )
                .await
        })
    };
    let second = {
        let service = h.service.clone();
        tokio::spawn(async move {
            let ctx = service.context();
            service
                .register_company_and_admin(
                    &ctx,
                    company(TAX_ID_A, "dois@padaria.com"),
                    account("Dois", "dois@padaria.com", "segredo123"),
                )
                .await
        })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| r == &Err(IdentityError::Validation(ValidationKind::DuplicateTaxId))));
    assert_eq!(h.store.companies_with_tax_id("11222333000181").await, 1);
}

#[tokio::test]
async fn test_dropped_caller_still_compensates() {
    let h = Harness::new().await;
    h.store.fail_next(StoreOperation::AtomicProcedure, denied());
    h.store.delay_next(StoreOperation::InsertUser, Duration::from_millis(300));
    h.store.fail_next(StoreOperation::InsertUser, StoreError::Backend("boom".into()));

    let ctx = h.service.context();
    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        h.service.register_company_and_admin(
            &ctx,
            company(TAX_ID_A, "contato@padaria.com"),
            account("Ana", "ana@padaria.com", "segredo123"),
        ),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(h.store.call_count(StoreOperation::DeleteCompany), 1);
    assert_eq!(h.store.companies_with_tax_id("11222333000181").await, 0);
}

#[tokio::test]
async fn test_expired_deadline_still_compensates() {
    let h = Harness::new().await;
    h.store.fail_next(StoreOperation::AtomicProcedure, denied());
    h.store.delay_next(StoreOperation::InsertUser, Duration::from_millis(500));

    let ctx = CallContext::with_timeout(Duration::from_millis(200));
    let err = h
        .service
        .register_company_and_admin(
            &ctx,
            company(TAX_ID_A, "contato@padaria.com"),
            account("Ana", "ana@padaria.com", "segredo123"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, IdentityError::Connectivity(_)));
    assert_eq!(h.store.companies_with_tax_id("11222333000181").await, 0);
    assert!(h.store.user_by_email("ana@padaria.com").await.is_none());
}

#[tokio::test]
async fn test_admin_written_after_deadline_is_not_compensated() {
    let h = Harness::new().await;
    h.store.fail_next(StoreOperation::AtomicProcedure, denied());
    h.store.settle_next(StoreOperation::InsertUser, Duration::from_millis(500));

    let ctx = CallContext::with_timeout(Duration::from_millis(200));
    let outcome = h
        .service
        .register_company_and_admin(
            &ctx,
            company(TAX_ID_A, "contato@padaria.com"),
            account("Ana", "ana@padaria.com", "segredo123"),
        )
        .await
        .unwrap();

    assert_eq!(outcome.path, RegistrationPath::Fallback);
    assert_eq!(h.store.call_count(StoreOperation::FindUserByEmail), 1);
    assert_eq!(h.store.call_count(StoreOperation::DeleteCompany), 0);
    assert_eq!(h.store.admins_of(outcome.company_id).await, 1);
    let admin = h.store.user_by_email("ana@padaria.com").await.unwrap();
    assert_eq!(admin.id, outcome.admin_id);
    assert!(h.service.connectivity_status().reachable);
}

#[tokio::test]
async fn test_unknown_admin_outcome_keeps_the_company() {
    let h = Harness::new().await;
    h.store.fail_next(StoreOperation::AtomicProcedure, denied());
    h.store.settle_next(StoreOperation::InsertUser, Duration::from_millis(500));
    h.store.fail_next(
        StoreOperation::FindUserByEmail,
        StoreError::Unavailable("connection reset".into()),
    );

    let ctx = CallContext::with_timeout(Duration::from_millis(200));
    let err = h
        .service
        .register_company_and_admin(
            &ctx,
            company(TAX_ID_A, "contato@padaria.com"),
            account("Ana", "ana@padaria.com", "segredo123"),
        )
        .await
        .unwrap_err();

    match err {
        IdentityError::Persistence(msg) => assert!(msg.contains("unknown outcome")),
        other => panic!("expected persistence error, got {:?}", other),
    }
    assert_eq!(h.store.call_count(StoreOperation::DeleteCompany), 0);
    assert_eq!(h.store.companies_with_tax_id("11222333000181").await, 1);
}
