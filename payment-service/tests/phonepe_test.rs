mod common;

use base64::{engine::general_purpose, Engine as _};
use common::{
    TestApp, FAILURE_URL, PHONEPE_MERCHANT_ID, PHONEPE_SALT_INDEX, PHONEPE_SALT_KEY, SUCCESS_URL,
};
use serde_json::json;
use service_core::integrity::sign;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Match, Mock, Request, ResponseTemplate};

/// Matches a pay request whose base64 payload names our merchant and amount.
struct PayPayload {
    amount: u64,
}

impl Match for PayPayload {
    fn matches(&self, request: &Request) -> bool {
        let Ok(body) = serde_json::from_slice::<serde_json::Value>(&request.body) else {
            return false;
        };
        let Some(encoded) = body["request"].as_str() else {
            return false;
        };
        let Ok(decoded) = general_purpose::STANDARD.decode(encoded) else {
            return false;
        };
        let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&decoded) else {
            return false;
        };

        payload["merchantId"] == PHONEPE_MERCHANT_ID
            && payload["amount"] == self.amount
            && payload["paymentInstrument"]["type"] == "PAY_PAGE"
            && payload["merchantTransactionId"]
                .as_str()
                .map(|id| id.starts_with("MT"))
                .unwrap_or(false)
    }
}

fn salted(canonical: &str) -> String {
    format!(
        "{}###{}",
        sign(canonical, PHONEPE_SALT_KEY).unwrap(),
        PHONEPE_SALT_INDEX
    )
}

fn status_checksum(transaction_id: &str) -> String {
    salted(&format!(
        "/pg/v1/status/{}/{}{}",
        PHONEPE_MERCHANT_ID, transaction_id, PHONEPE_SALT_KEY
    ))
}

fn status_body(code: &str, state: &str, transaction_id: &str) -> serde_json::Value {
    json!({
        "success": code == "PAYMENT_SUCCESS",
        "code": code,
        "message": "Status fetched",
        "data": {
            "merchantId": PHONEPE_MERCHANT_ID,
            "merchantTransactionId": transaction_id,
            "transactionId": "T2401011200",
            "amount": 10_000,
            "state": state,
            "responseCode": "SUCCESS"
        }
    })
}

async fn mount_status(app: &TestApp, transaction_id: &str, status: u16, code: &str, state: &str) {
    Mock::given(method("GET"))
        .and(path(format!(
            "/pg/v1/status/{}/{}",
            PHONEPE_MERCHANT_ID, transaction_id
        )))
        .and(header("X-VERIFY", status_checksum(transaction_id).as_str()))
        .and(header("X-MERCHANT-ID", PHONEPE_MERCHANT_ID))
        .respond_with(
            ResponseTemplate::new(status).set_body_json(status_body(code, state, transaction_id)),
        )
        .expect(1)
        .mount(&app.gateway)
        .await;
}

#[tokio::test]
async fn pay_returns_gateway_redirect() {
    let app = TestApp::spawn().await;

    Mock::given(method("POST"))
        .and(path("/pg/v1/pay"))
        .and(header_exists("X-VERIFY"))
        .and(PayPayload { amount: 10_000 })
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "code": "PAYMENT_INITIATED",
            "message": "Payment initiated",
            "data": {
                "merchantId": PHONEPE_MERCHANT_ID,
                "merchantTransactionId": "MT-ignored",
                "instrumentResponse": {
                    "type": "PAY_PAGE",
                    "redirectInfo": {
                        "url": "https://mercury-uat.phonepe.com/transact/pg?token=abc",
                        "method": "GET"
                    }
                }
            }
        })))
        .expect(1)
        .mount(&app.gateway)
        .await;

    let response = app.post_json("/phonepe/pay", json!({ "amount": 100 })).await;

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(
        body["redirect_url"],
        "https://mercury-uat.phonepe.com/transact/pg?token=abc"
    );
    assert_eq!(body["merchant_transaction_id"].as_str().unwrap().len(), 34);
}

#[tokio::test]
async fn pay_maps_gateway_failure_to_bad_gateway() {
    let app = TestApp::spawn().await;

    Mock::given(method("POST"))
        .and(path("/pg/v1/pay"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "success": false,
            "code": "BAD_REQUEST",
            "message": "Please check the inputs you have provided."
        })))
        .expect(1)
        .mount(&app.gateway)
        .await;

    let response = app.post_json("/phonepe/pay", json!({ "amount": "1" })).await;

    assert_eq!(response.status().as_u16(), 502);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Payment initiation failed");
}

#[tokio::test]
async fn pay_rejects_invalid_input() {
    let app = TestApp::spawn().await;

    for body in [
        json!({}),
        json!({ "amount": 0 }),
        json!({ "amount": 10, "mobile_number": "12ab" }),
        json!({ "amount": "1e300" }),
    ] {
        let response = app.post_json("/phonepe/pay", body.clone()).await;
        assert_eq!(response.status().as_u16(), 400, "body: {}", body);
    }

    assert!(app.gateway.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn status_is_signed_and_reported() {
    let app = TestApp::spawn().await;
    mount_status(&app, "MT100", 200, "PAYMENT_SUCCESS", "COMPLETED").await;

    let response = app
        .client
        .get(app.url("/phonepe/status/MT100"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["code"], "PAYMENT_SUCCESS");
    assert_eq!(body["state"], "COMPLETED");
    assert_eq!(body["merchant_transaction_id"], "MT100");
    assert_eq!(body["amount"], 10_000);
}

#[tokio::test]
async fn status_rejects_malformed_transaction_id() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/phonepe/status/MT.bad"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    assert!(app.gateway.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn redirect_goes_to_success_only_after_verified_status() {
    let app = TestApp::spawn().await;
    mount_status(&app, "MT200", 200, "PAYMENT_SUCCESS", "COMPLETED").await;

    let response = app
        .client
        .post(app.url("/phonepe/redirect"))
        .form(&[
            ("code", "PAYMENT_SUCCESS"),
            ("merchantId", PHONEPE_MERCHANT_ID),
            ("transactionId", "MT200"),
        ])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 303);
    assert_eq!(
        response.headers().get("location").unwrap(),
        &format!("{}?transactionId=MT200", SUCCESS_URL)
    );
}

#[tokio::test]
async fn redirect_ignores_claimed_success() {
    let app = TestApp::spawn().await;
    mount_status(&app, "MT300", 400, "PAYMENT_ERROR", "FAILED").await;

    let response = app
        .client
        .post(app.url("/phonepe/redirect"))
        .form(&[
            ("code", "PAYMENT_SUCCESS"),
            ("merchantId", PHONEPE_MERCHANT_ID),
            ("transactionId", "MT300"),
        ])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 303);
    assert_eq!(
        response.headers().get("location").unwrap(),
        &format!("{}?transactionId=MT300", FAILURE_URL)
    );
}

#[tokio::test]
async fn redirect_falls_back_to_failure_when_gateway_is_down() {
    let app = TestApp::spawn().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .expect(1)
        .mount(&app.gateway)
        .await;

    let response = app
        .client
        .post(app.url("/phonepe/redirect"))
        .form(&[
            ("code", "PAYMENT_SUCCESS"),
            ("merchantId", PHONEPE_MERCHANT_ID),
            ("transactionId", "MT900"),
        ])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 303);
    assert_eq!(
        response.headers().get("location").unwrap(),
        &format!("{}?transactionId=MT900", FAILURE_URL)
    );
}

#[tokio::test]
async fn redirect_with_malformed_transaction_id_goes_to_failure() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/phonepe/redirect"))
        .form(&[
            ("merchantId", PHONEPE_MERCHANT_ID),
            ("transactionId", "MT/../pay"),
        ])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 303);
    let location = response.headers().get("location").unwrap().to_str().unwrap();
    assert!(location.starts_with(FAILURE_URL));
    assert!(app.gateway.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn redirect_missing_field_is_json_bad_request() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/phonepe/redirect"))
        .form(&[("code", "PAYMENT_SUCCESS"), ("merchantId", PHONEPE_MERCHANT_ID)])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("transactionId"));
}

#[tokio::test]
async fn pay_malformed_json_is_json_bad_request() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/phonepe/pay"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn redirect_rejects_foreign_merchant() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/phonepe/redirect"))
        .form(&[
            ("code", "PAYMENT_SUCCESS"),
            ("merchantId", "SOMEONE_ELSE"),
            ("transactionId", "MT400"),
        ])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn callback_verifies_checksum() {
    let app = TestApp::spawn().await;
    let encoded = general_purpose::STANDARD.encode(
        status_body("PAYMENT_SUCCESS", "COMPLETED", "MT500").to_string(),
    );
    let body = json!({ "response": encoded }).to_string();
    let valid = salted(&format!("{}{}", encoded, PHONEPE_SALT_KEY));

    let ok = app
        .client
        .post(app.url("/phonepe/callback"))
        .header("X-VERIFY", valid.as_str())
        .header("content-type", "application/json")
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status().as_u16(), 200);

    let forged = app
        .client
        .post(app.url("/phonepe/callback"))
        .header("X-VERIFY", format!("{}###2", &valid[..64]))
        .header("content-type", "application/json")
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status().as_u16(), 401);

    let missing = app
        .client
        .post(app.url("/phonepe/callback"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 401);
}

#[tokio::test]
async fn callback_rejects_malformed_body() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/phonepe/callback"))
        .header("X-VERIFY", "abc###1")
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
}
