//! Razorpay payment handlers.
//!
//! Implements order creation, payment verification, and webhook handling
//! for Razorpay payment integration.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{amount_from_number_or_string, to_minor_units},
    services::{
        metrics::record_gateway_request,
        razorpay::{PaymentVerification, RazorpayOrder},
    },
    startup::AppState,
};

pub const SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

/// Request to create a new Razorpay order.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    /// Amount in rupees; converted to paise before reaching Razorpay.
    #[serde(default, deserialize_with = "amount_from_number_or_string")]
    #[validate(required, range(exclusive_min = 0.0))]
    pub amount: Option<f64>,
    /// Currency code (e.g., "INR").
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Optional notes to attach to the order.
    pub notes: Option<serde_json::Value>,
}

fn default_currency() -> String {
    "INR".to_string()
}

/// The gateway's order, plus the key id the frontend needs for checkout.
#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    #[serde(flatten)]
    pub order: RazorpayOrder,
    pub key_id: String,
}

/// Fields returned by Razorpay checkout. All three are required; they are
/// optional here so a missing field maps to one 400 message.
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub razorpay_signature: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub message: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Create a new Razorpay order.
pub async fn create_order(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<CreateOrderRequest>, AppError>,
) -> Result<Json<CreateOrderResponse>, AppError> {
    let razorpay = state.razorpay()?;

    payload
        .validate()
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid amount")))?;
    let amount = payload
        .amount
        .and_then(to_minor_units)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid amount")))?;

    let receipt = format!("rcpt_{}", chrono::Utc::now().timestamp_millis());

    tracing::info!(
        amount = amount,
        currency = %payload.currency,
        receipt = %receipt,
        "Creating Razorpay order"
    );

    let order = razorpay
        .create_order(amount, &payload.currency, Some(receipt), payload.notes)
        .await;
    record_gateway_request("razorpay", "create_order", order.is_ok());

    let order = order.map_err(|e| {
        tracing::error!(error = %e, "Failed to create Razorpay order");
        AppError::BadGateway("Order creation failed".to_string())
    })?;

    Ok(Json(CreateOrderResponse {
        order,
        key_id: razorpay.key_id().to_string(),
    }))
}

/// Verify a payment after Razorpay checkout completion.
pub async fn verify_payment(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<VerifyPaymentRequest>, AppError>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    let razorpay = state.razorpay()?;

    let (Some(razorpay_order_id), Some(razorpay_payment_id), Some(razorpay_signature)) = (
        non_empty(payload.razorpay_order_id),
        non_empty(payload.razorpay_payment_id),
        non_empty(payload.razorpay_signature),
    ) else {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Missing payment verification fields"
        )));
    };

    let verification = PaymentVerification {
        razorpay_order_id,
        razorpay_payment_id,
        razorpay_signature,
    };

    if !razorpay.verify_payment_signature(&verification) {
        return Err(AppError::BadRequest(anyhow::anyhow!("Invalid signature")));
    }

    Ok(Json(VerifyPaymentResponse {
        success: true,
        message: "Payment verified".to_string(),
    }))
}

/// Razorpay webhook handler.
///
/// Verifies the signature over the raw body before parsing anything.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    let razorpay = state.razorpay()?;

    if !razorpay.webhook_enabled() {
        return Err(AppError::ServiceUnavailable(
            "Razorpay webhooks are not configured".to_string(),
        ));
    }

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Missing X-Razorpay-Signature header");
            AppError::Unauthorized(anyhow::anyhow!("Missing webhook signature"))
        })?;

    if !razorpay.verify_webhook_signature(&body, signature) {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Invalid webhook signature"
        )));
    }

    let event = razorpay.parse_webhook_event(&body).map_err(|e| {
        tracing::error!(error = %e, "Failed to parse webhook event");
        AppError::BadRequest(anyhow::anyhow!("Invalid webhook payload"))
    })?;

    tracing::info!(
        event_type = %event.event,
        account_id = %event.account_id,
        "Processing Razorpay webhook"
    );

    match event.event.as_str() {
        "payment.captured" | "payment.failed" => {
            if let Some(ref payment_entity) = event.payload.payment {
                let payment = &payment_entity.entity;
                tracing::info!(
                    event_type = %event.event,
                    payment_id = %payment.id,
                    order_id = ?payment.order_id,
                    amount = payment.amount,
                    status = %payment.status,
                    "Payment webhook received"
                );
            }
        }
        "order.paid" => {
            if let Some(ref order_entity) = event.payload.order {
                let order = &order_entity.entity;
                tracing::info!(
                    order_id = %order.id,
                    amount = order.amount,
                    "Order paid webhook received"
                );
            }
        }
        _ => {
            tracing::debug!(event_type = %event.event, "Unhandled webhook event type");
        }
    }

    Ok(Json(VerifyPaymentResponse {
        success: true,
        message: "Webhook processed".to_string(),
    }))
}
