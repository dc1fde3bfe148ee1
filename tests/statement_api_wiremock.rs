mod support;

use anyhow::Result;
use bankmatch::credentials::StaticCredentialStore;
use bankmatch::error::ProviderError;
use bankmatch::models::Direction;
use bankmatch::providers::{BankProvider, StatementApiProvider};
use secrecy::SecretString;
use support::{bank_account, day, try_amount, ACCOUNT_IBAN, BANK_CODE};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> StatementApiProvider {
    StatementApiProvider::new(BANK_CODE, SecretString::from("test-token".to_string())).with_base_url(server.uri())
}

#[tokio::test]
async fn fetches_and_maps_statement_lines() -> Result<()> {
    let server = MockServer::start().await;

    let body = r#"{
        "transactions": [
            {
                "bookingDate": "2026-01-05",
                "valueDate": "2026-01-06",
                "amount": "850.00",
                "currency": "TRY",
                "counterpartyName": "AYSE KAYA",
                "counterpartyIban": "TR330006100519786457841326",
                "description": "AIDAT OCAK D.12",
                "reference": "ZR-1001"
            },
            {
                "bookingDate": "2026-01-07",
                "amount": "-5000.00",
                "description": "TEMIZLIK"
            },
            {
                "bookingDate": "2026-01-08",
                "amount": "300",
                "direction": "DEBIT"
            }
        ]
    }"#;
    Mock::given(method("GET"))
        .and(path(format!("/accounts/{ACCOUNT_IBAN}/transactions")))
        .and(query_param("from", "2026-01-01"))
        .and(query_param("to", "2026-01-31"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(&server)
        .await;

    let lines = provider(&server)
        .fetch_transactions(&bank_account(), day(1), day(31))
        .await?;
    assert_eq!(lines.len(), 3);

    assert_eq!(lines[0].direction, Direction::In);
    assert_eq!(lines[0].amount, try_amount(85000));
    assert_eq!(lines[0].value_date, Some(day(6)));
    assert_eq!(lines[0].reference.as_deref(), Some("ZR-1001"));

    assert_eq!(lines[1].direction, Direction::Out);
    assert_eq!(lines[1].amount, try_amount(500000));

    assert_eq!(lines[2].direction, Direction::Out);
    assert_eq!(lines[2].description, "");
    Ok(())
}

#[tokio::test]
async fn unreadable_lines_are_skipped_not_fatal() -> Result<()> {
    let server = MockServer::start().await;
    let body = r#"{
        "transactions": [
            {
                "bookingDate": "2026-01-05",
                "amount": "850.00",
                "description": "AIDAT OCAK D.12"
            },
            {
                "bookingDate": "2026-01-06",
                "amount": "850.00",
                "direction": "REVERSAL",
                "description": "IPTAL"
            },
            {
                "amount": "100.00",
                "description": "TARIHSIZ"
            }
        ]
    }"#;
    Mock::given(method("GET"))
        .and(path(format!("/accounts/{ACCOUNT_IBAN}/transactions")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(&server)
        .await;

    let lines = provider(&server)
        .fetch_transactions(&bank_account(), day(1), day(31))
        .await?;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].amount, try_amount(85000));
    assert_eq!(lines[0].direction, Direction::In);
    assert_eq!(lines[0].description, "AIDAT OCAK D.12");
    Ok(())
}

#[tokio::test]
async fn fetches_balance() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/accounts/{ACCOUNT_IBAN}/balance")))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"{"balance": "15250.75"}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let balance = provider(&server).fetch_balance(&bank_account()).await?;
    assert_eq!(balance, try_amount(1525075));
    Ok(())
}

#[tokio::test]
async fn unauthorized_maps_to_auth_error() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/check"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;

    let err = provider(&server).validate_credentials().await.unwrap_err();
    assert!(matches!(err, ProviderError::Auth { .. }));
    assert!(!err.is_transient());
    Ok(())
}

#[tokio::test]
async fn server_errors_are_transient() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/accounts/{ACCOUNT_IBAN}/transactions")))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = provider(&server)
        .fetch_transactions(&bank_account(), day(1), day(31))
        .await
        .unwrap_err();
    match &err {
        ProviderError::Rejected { status, message, .. } => {
            assert_eq!(*status, 503);
            assert_eq!(message, "maintenance");
        }
        other => panic!("expected rejected, got {other:?}"),
    }
    assert!(err.is_transient());
    Ok(())
}

#[tokio::test]
async fn malformed_body_is_reported() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/accounts/{ACCOUNT_IBAN}/transactions")))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"{"lines": []}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let err = provider(&server)
        .fetch_transactions(&bank_account(), day(1), day(31))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Malformed { .. }));
    Ok(())
}

#[tokio::test]
async fn provider_is_built_from_stored_credentials() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/check"))
        .and(header("authorization", "Bearer from-store"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
        .mount(&server)
        .await;

    let store = StaticCredentialStore::new().with("0010/token", "from-store");
    let provider = StatementApiProvider::from_credentials(BANK_CODE, &store, "0010/token")
        .await?
        .with_base_url(server.uri());
    provider.validate_credentials().await?;

    let missing = StatementApiProvider::from_credentials(BANK_CODE, &store, "0062/token").await;
    assert!(missing.is_err());
    Ok(())
}
