//! PhonePe payment handlers.
//!
//! The browser redirect is never trusted on its own: the outcome shown to
//! the customer always comes from a signed status poll, and server callbacks
//! are checked against `X-VERIFY` before their contents are used.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::Redirect,
    Form, Json,
};
use axum_extra::extract::WithRejection;
use reqwest::Url;
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        to_minor_units, PhonePeCallbackBody, PhonePePayRequest, PhonePePayResponse,
        PhonePeRedirectForm, PhonePeStatusResponse,
    },
    services::{
        metrics::record_gateway_request,
        phonepe::{decode_payload, is_valid_transaction_id, StatusResponse, X_VERIFY},
    },
    startup::AppState,
};

fn new_merchant_transaction_id() -> String {
    format!("MT{}", Uuid::new_v4().simple())
}

fn new_merchant_user_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("MUID{}", &id[..12])
}

/// Start a PhonePe pay-page checkout.
pub async fn pay(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<PhonePePayRequest>, AppError>,
) -> Result<Json<PhonePePayResponse>, AppError> {
    let phonepe = state.phonepe()?;

    payload.validate()?;
    let amount = payload
        .amount
        .and_then(to_minor_units)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid amount")))?;

    let merchant_transaction_id = new_merchant_transaction_id();
    let request = phonepe.build_pay_request(
        amount,
        merchant_transaction_id.clone(),
        payload
            .merchant_user_id
            .unwrap_or_else(new_merchant_user_id),
        payload.mobile_number,
    );

    tracing::info!(
        merchant_transaction_id = %merchant_transaction_id,
        amount = amount,
        "Initiating PhonePe payment"
    );

    let response = phonepe.initiate_payment(&request).await;
    record_gateway_request("phonepe", "pay", response.is_ok());

    let response = response.map_err(|e| {
        tracing::error!(error = %e, "Failed to initiate PhonePe payment");
        AppError::BadGateway("Payment initiation failed".to_string())
    })?;

    let redirect_url = response
        .redirect_url()
        .ok_or_else(|| AppError::BadGateway("Payment initiation failed".to_string()))?
        .to_string();

    Ok(Json(PhonePePayResponse {
        success: true,
        merchant_transaction_id,
        redirect_url,
    }))
}

async fn poll_status(state: &AppState, transaction_id: &str) -> Result<StatusResponse, AppError> {
    let phonepe = state.phonepe()?;

    if !is_valid_transaction_id(transaction_id) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Invalid transaction id"
        )));
    }

    let status = phonepe.check_status(transaction_id).await;
    record_gateway_request("phonepe", "status", status.is_ok());

    status.map_err(|e| {
        tracing::error!(
            merchant_transaction_id = %transaction_id,
            error = %e,
            "Failed to fetch PhonePe status"
        );
        AppError::BadGateway("Status check failed".to_string())
    })
}

/// Poll PhonePe for the status of a transaction.
pub async fn status(
    State(state): State<AppState>,
    WithRejection(Path(transaction_id), _): WithRejection<Path<String>, AppError>,
) -> Result<Json<PhonePeStatusResponse>, AppError> {
    let response = poll_status(&state, &transaction_id).await?;
    let data = response.data.as_ref();

    Ok(Json(PhonePeStatusResponse {
        success: response.is_paid(),
        code: response.code.clone(),
        message: response.message.clone(),
        state: data.and_then(|d| d.state.clone()),
        transaction_id: data.and_then(|d| d.transaction_id.clone()),
        merchant_transaction_id: transaction_id,
        amount: data.and_then(|d| d.amount),
    }))
}

fn outcome_url(base: &str, transaction_id: &str) -> Result<String, AppError> {
    let mut url = Url::parse(base)
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid redirect target: {}", e)))?;
    url.query_pairs_mut()
        .append_pair("transactionId", transaction_id);
    Ok(url.to_string())
}

/// Browser lands here after checkout. The posted `code` is informational
/// only; success is decided by a signed status poll.
pub async fn redirect(
    State(state): State<AppState>,
    WithRejection(Form(form), _): WithRejection<Form<PhonePeRedirectForm>, AppError>,
) -> Result<Redirect, AppError> {
    let phonepe = state.phonepe()?;

    if form.merchant_id != phonepe.merchant_id() {
        tracing::warn!(merchant_id = %form.merchant_id, "Redirect for unknown merchant");
        return Err(AppError::BadRequest(anyhow::anyhow!("Unknown merchant")));
    }

    // A failed poll is an unverified payment: the browser still gets a page.
    let paid = match poll_status(&state, &form.transaction_id).await {
        Ok(status) => {
            tracing::info!(
                merchant_transaction_id = %form.transaction_id,
                reported_code = ?form.code,
                verified_code = %status.code,
                "PhonePe redirect received"
            );
            status.is_paid()
        }
        Err(e) => {
            tracing::warn!(
                merchant_transaction_id = %form.transaction_id,
                reported_code = ?form.code,
                error = %e,
                "PhonePe redirect could not be verified"
            );
            false
        }
    };

    let target = if paid {
        phonepe.success_url()
    } else {
        phonepe.failure_url()
    };

    Ok(Redirect::to(&outcome_url(target, &form.transaction_id)?))
}

/// Server-to-server notification from PhonePe.
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let phonepe = state.phonepe()?;

    let x_verify = headers
        .get(X_VERIFY)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Missing X-VERIFY header on PhonePe callback");
            AppError::Unauthorized(anyhow::anyhow!("Missing callback checksum"))
        })?;

    let callback: PhonePeCallbackBody = serde_json::from_slice(&body)
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid callback payload")))?;

    if !phonepe.verify_callback(&callback.response, x_verify) {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Invalid callback checksum"
        )));
    }

    let decoded: StatusResponse = decode_payload(&callback.response).map_err(|e| {
        tracing::error!(error = %e, "Failed to decode PhonePe callback");
        AppError::BadRequest(anyhow::anyhow!("Invalid callback payload"))
    })?;

    let data = decoded.data.as_ref();
    tracing::info!(
        code = %decoded.code,
        merchant_transaction_id = ?data.map(|d| d.merchant_transaction_id.as_str()),
        state = ?data.and_then(|d| d.state.as_deref()),
        "PhonePe callback verified"
    );

    Ok(Json(json!({ "success": true })))
}
