//! Razorpay payment provider client.
//!
//! Implements Razorpay's Orders API for payment initiation and
//! signature verification for checkout confirmation and webhooks.

use crate::config::RazorpayConfig;
use anyhow::{anyhow, Result};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::integrity::{CanonicalPayload, IntegrityError, PaymentIntegrityVerifier};

/// Razorpay client for interacting with the Razorpay API.
#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    config: RazorpayConfig,
    payment_verifier: PaymentIntegrityVerifier,
    webhook_verifier: Option<PaymentIntegrityVerifier>,
}

/// Request to create a Razorpay order.
#[derive(Debug, Serialize)]
pub struct CreateOrderRequest {
    /// Amount in smallest currency unit (paise for INR).
    pub amount: u64,
    /// Currency code (e.g., "INR").
    pub currency: String,
    /// Receipt ID for tracking (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    /// Notes for the order (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<serde_json::Value>,
}

/// Response from Razorpay order creation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RazorpayOrder {
    /// Razorpay order ID.
    pub id: String,
    /// Entity type (always "order").
    pub entity: String,
    /// Amount in smallest currency unit.
    pub amount: u64,
    #[serde(default)]
    pub amount_paid: u64,
    #[serde(default)]
    pub amount_due: u64,
    pub currency: String,
    pub receipt: Option<String>,
    /// Order status.
    pub status: String,
    #[serde(default)]
    pub attempts: u32,
    /// Razorpay sends `[]` when no notes are set, an object otherwise.
    pub notes: Option<serde_json::Value>,
    pub created_at: u64,
}

/// Razorpay API error response.
#[derive(Debug, Deserialize)]
pub struct RazorpayError {
    pub error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayErrorDetail {
    pub code: String,
    pub description: String,
    pub source: Option<String>,
    pub step: Option<String>,
    pub reason: Option<String>,
}

/// Payment verification parameters returned by Razorpay checkout.
#[derive(Debug)]
pub struct PaymentVerification {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

impl CanonicalPayload for PaymentVerification {
    fn canonical_string(&self) -> String {
        format!("{}|{}", self.razorpay_order_id, self.razorpay_payment_id)
    }
}

/// Razorpay webhook event.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub entity: String,
    pub account_id: String,
    pub event: String,
    #[serde(default)]
    pub contains: Vec<String>,
    pub payload: WebhookPayload,
    pub created_at: u64,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<WebhookPaymentEntity>,
    pub order: Option<WebhookOrderEntity>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPaymentEntity {
    pub entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
pub struct WebhookOrderEntity {
    pub entity: RazorpayOrder,
}

/// Razorpay payment entity.
#[derive(Debug, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    pub entity: String,
    pub amount: u64,
    pub currency: String,
    pub status: String,
    pub order_id: Option<String>,
    pub method: Option<String>,
    pub captured: Option<bool>,
    pub created_at: u64,
}

impl RazorpayClient {
    /// Create a new Razorpay client. Fails on an empty key or webhook secret.
    pub fn new(config: RazorpayConfig, client: Client) -> Result<Self, IntegrityError> {
        let payment_verifier = PaymentIntegrityVerifier::new(&config.key_secret)?;
        let webhook_verifier = config
            .webhook_secret
            .as_ref()
            .map(PaymentIntegrityVerifier::new)
            .transpose()?;

        Ok(Self {
            client,
            config,
            payment_verifier,
            webhook_verifier,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    pub fn webhook_enabled(&self) -> bool {
        self.webhook_verifier.is_some()
    }

    /// Create a new order in Razorpay.
    ///
    /// # Arguments
    /// * `amount` - Amount in smallest currency unit (paise for INR)
    /// * `currency` - Currency code (e.g., "INR")
    /// * `receipt` - Optional receipt ID for tracking
    /// * `notes` - Optional notes
    pub async fn create_order(
        &self,
        amount: u64,
        currency: &str,
        receipt: Option<String>,
        notes: Option<serde_json::Value>,
    ) -> Result<RazorpayOrder> {
        let request = CreateOrderRequest {
            amount,
            currency: currency.to_string(),
            receipt,
            notes,
        };

        let url = format!("{}/orders", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, "Razorpay create_order response");

        if status.is_success() {
            let order: RazorpayOrder = serde_json::from_str(&body)?;
            tracing::info!(
                order_id = %order.id,
                amount = order.amount,
                currency = %order.currency,
                "Razorpay order created"
            );
            Ok(order)
        } else {
            let error: RazorpayError =
                serde_json::from_str(&body).unwrap_or_else(|_| RazorpayError {
                    error: RazorpayErrorDetail {
                        code: "UNKNOWN".to_string(),
                        description: format!("HTTP {}", status),
                        source: None,
                        step: None,
                        reason: None,
                    },
                });
            tracing::error!(
                code = %error.error.code,
                description = %error.error.description,
                "Razorpay order creation failed"
            );
            Err(anyhow!(
                "Razorpay error: {} - {}",
                error.error.code,
                error.error.description
            ))
        }
    }

    /// Verify payment signature from Razorpay checkout.
    ///
    /// The signature is computed as:
    /// `HMAC-SHA256(order_id + "|" + payment_id, key_secret)`
    pub fn verify_payment_signature(&self, verification: &PaymentVerification) -> bool {
        let is_valid = self
            .payment_verifier
            .verify_payload(verification, &verification.razorpay_signature);

        crate::services::metrics::record_verification("razorpay", is_valid);

        if is_valid {
            tracing::info!(
                order_id = %verification.razorpay_order_id,
                payment_id = %verification.razorpay_payment_id,
                "Payment signature verified successfully"
            );
        } else {
            tracing::warn!(
                order_id = %verification.razorpay_order_id,
                payment_id = %verification.razorpay_payment_id,
                "Payment signature verification failed"
            );
        }

        is_valid
    }

    /// Verify webhook signature.
    ///
    /// The signature is computed as:
    /// `HMAC-SHA256(request_body, webhook_secret)`.
    /// Always false when no webhook secret is configured.
    pub fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        let Some(verifier) = &self.webhook_verifier else {
            return false;
        };

        let is_valid = verifier.verify(body, signature);

        crate::services::metrics::record_verification("razorpay_webhook", is_valid);

        if !is_valid {
            tracing::warn!("Webhook signature verification failed");
        }

        is_valid
    }

    /// Parse webhook event from request body.
    pub fn parse_webhook_event(&self, body: &[u8]) -> Result<WebhookEvent> {
        let event: WebhookEvent = serde_json::from_slice(body)?;
        Ok(event)
    }
}
