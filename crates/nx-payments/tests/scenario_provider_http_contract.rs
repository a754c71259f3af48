//! HTTP provider contract against a mock server: endpoint paths, request
//! bodies, and response decoding. No network, no database.

use httpmock::prelude::*;
use nx_config::ProviderConfig;
use nx_payments::{HttpProvider, ProviderApi};
use nx_schemas::ProviderInitRequest;

fn test_config(base_url: String) -> ProviderConfig {
    ProviderConfig {
        api_key: "test-api-key".into(),
        site_id: "test-site".into(),
        secret_key: "test-secret".into(),
        base_url,
        return_url: "https://portal.example.test/billing/return".into(),
        cancel_url: "https://portal.example.test/billing/cancel".into(),
        notify_url: "https://portal.example.test/v1/payments/webhook".into(),
    }
}

fn init_request(config: &ProviderConfig) -> ProviderInitRequest {
    ProviderInitRequest {
        amount: 120.0,
        currency: "EUR".into(),
        apikey: config.api_key.clone(),
        site_id: config.site_id.clone(),
        transaction_id: "NX-test-1".into(),
        description: "Invoice FA-2026-0001".into(),
        return_url: config.return_url.clone(),
        cancel_url: config.cancel_url.clone(),
        notify_url: config.notify_url.clone(),
        customer_name: "Ada".into(),
        customer_email: "ada@example.test".into(),
    }
}

#[tokio::test]
async fn init_payment_returns_checkout_url() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v2/payment")
                .json_body_partial(r#"{"transaction_id": "NX-test-1", "site_id": "test-site"}"#);
            then.status(200).json_body(serde_json::json!({
                "code": "201",
                "message": "CREATED",
                "data": {
                    "payment_url": "https://checkout.example.test/pay/abc",
                    "payment_token": "tok-abc"
                }
            }));
        })
        .await;

    let config = test_config(server.base_url());
    let provider = HttpProvider::new(config.clone());

    let resp = provider
        .init_payment(&init_request(&config))
        .await
        .expect("init should succeed");

    mock.assert_async().await;
    let data = resp.data.expect("data present");
    assert_eq!(
        data.payment_url.as_deref(),
        Some("https://checkout.example.test/pay/abc")
    );
    assert_eq!(data.payment_token.as_deref(), Some("tok-abc"));
}

#[tokio::test]
async fn check_payment_reports_provider_status() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v2/payment/check")
                .json_body_partial(r#"{"transaction_id": "NX-test-2", "apikey": "test-api-key"}"#);
            then.status(200).json_body(serde_json::json!({
                "code": "00",
                "message": "SUCCES",
                "data": { "status": "ACCEPTED" }
            }));
        })
        .await;

    let provider = HttpProvider::new(test_config(server.base_url()));

    let resp = provider
        .check_payment("NX-test-2")
        .await
        .expect("check should succeed");

    mock.assert_async().await;
    assert_eq!(resp.status(), Some("ACCEPTED"));
}

#[tokio::test]
async fn provider_http_error_surfaces_as_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v2/payment/check");
            then.status(403).json_body(serde_json::json!({
                "code": "608",
                "message": "MINIMUM_REQUIRED_FIELDS"
            }));
        })
        .await;

    let provider = HttpProvider::new(test_config(server.base_url()));

    let err = provider
        .check_payment("NX-test-3")
        .await
        .expect_err("403 must be an error");
    let msg = format!("{err:#}");
    assert!(msg.contains("608"), "error should carry the provider code: {msg}");
}
