//! PhonePe payment gateway client.
//!
//! PhonePe authenticates every request with an `X-VERIFY` header carrying a
//! salted checksum: the HMAC-SHA256 of a canonical string keyed by the
//! merchant salt key, followed by `###` and the salt index.

use crate::config::PhonePeConfig;
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use service_core::integrity::{
    CanonicalPayload, IntegrityError, PaymentIntegrityVerifier, SaltedChecksum,
};

pub const PAY_API_PATH: &str = "/pg/v1/pay";
pub const STATUS_API_PATH: &str = "/pg/v1/status";
pub const X_VERIFY: &str = "X-VERIFY";
pub const X_MERCHANT_ID: &str = "X-MERCHANT-ID";
pub const PAYMENT_SUCCESS: &str = "PAYMENT_SUCCESS";

/// PhonePe rejects merchant transaction ids longer than this.
pub const MAX_TRANSACTION_ID_LEN: usize = 35;

/// Pay request payload, base64-encoded into the `request` body field.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayRequestPayload {
    pub merchant_id: String,
    pub merchant_transaction_id: String,
    pub merchant_user_id: String,
    /// Amount in paise.
    pub amount: u64,
    pub redirect_url: String,
    pub redirect_mode: String,
    pub callback_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_number: Option<String>,
    pub payment_instrument: PaymentInstrument,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentInstrument {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Canonical string for `/pg/v1/pay`: `base64(payload) + path + saltKey`.
pub struct PaySigningInput<'a> {
    pub encoded_payload: &'a str,
    pub salt_key: &'a str,
}

impl CanonicalPayload for PaySigningInput<'_> {
    fn canonical_string(&self) -> String {
        format!("{}{}{}", self.encoded_payload, PAY_API_PATH, self.salt_key)
    }
}

/// Canonical string for status polling:
/// `/pg/v1/status/{merchantId}/{transactionId} + saltKey`.
pub struct StatusSigningInput<'a> {
    pub merchant_id: &'a str,
    pub merchant_transaction_id: &'a str,
    pub salt_key: &'a str,
}

impl CanonicalPayload for StatusSigningInput<'_> {
    fn canonical_string(&self) -> String {
        format!(
            "{}/{}/{}{}",
            STATUS_API_PATH, self.merchant_id, self.merchant_transaction_id, self.salt_key
        )
    }
}

/// Canonical string for server callbacks: `base64(response) + saltKey`.
pub struct CallbackSigningInput<'a> {
    pub encoded_response: &'a str,
    pub salt_key: &'a str,
}

impl CanonicalPayload for CallbackSigningInput<'_> {
    fn canonical_string(&self) -> String {
        format!("{}{}", self.encoded_response, self.salt_key)
    }
}

/// Envelope shared by every PhonePe response.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhonePeResponse<T> {
    pub success: bool,
    pub code: String,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayResponseData {
    pub merchant_id: String,
    pub merchant_transaction_id: String,
    pub instrument_response: Option<InstrumentResponse>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub redirect_info: Option<RedirectInfo>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedirectInfo {
    pub url: String,
    pub method: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionData {
    pub merchant_id: String,
    pub merchant_transaction_id: String,
    pub transaction_id: Option<String>,
    pub amount: Option<u64>,
    pub state: Option<String>,
    pub response_code: Option<String>,
}

pub type PayResponse = PhonePeResponse<PayResponseData>;
pub type StatusResponse = PhonePeResponse<TransactionData>;

impl PayResponse {
    pub fn redirect_url(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.instrument_response.as_ref())
            .and_then(|i| i.redirect_info.as_ref())
            .map(|r| r.url.as_str())
    }
}

impl StatusResponse {
    pub fn is_paid(&self) -> bool {
        self.success && self.code == PAYMENT_SUCCESS
    }
}

#[derive(Serialize)]
struct PayRequestBody<'a> {
    request: &'a str,
}

/// Transaction ids travel inside URL paths, so only a conservative alphabet
/// is accepted.
pub fn is_valid_transaction_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_TRANSACTION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub fn encode_payload<T: Serialize>(payload: &T) -> Result<String> {
    let json = serde_json::to_vec(payload).context("Failed to serialize PhonePe payload")?;
    Ok(general_purpose::STANDARD.encode(json))
}

pub fn decode_payload<T: DeserializeOwned>(encoded: &str) -> Result<T> {
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .context("PhonePe payload is not valid base64")?;
    serde_json::from_slice(&bytes).context("PhonePe payload is not valid JSON")
}

/// PhonePe client for pay requests, status polling and callback checks.
#[derive(Clone)]
pub struct PhonePeClient {
    client: Client,
    config: PhonePeConfig,
    verifier: PaymentIntegrityVerifier,
}

impl PhonePeClient {
    pub fn new(config: PhonePeConfig, client: Client) -> Result<Self, IntegrityError> {
        let verifier = PaymentIntegrityVerifier::new(&config.salt_key)?;
        Ok(Self {
            client,
            config,
            verifier,
        })
    }

    pub fn merchant_id(&self) -> &str {
        &self.config.merchant_id
    }

    pub fn success_url(&self) -> &str {
        &self.config.success_url
    }

    pub fn failure_url(&self) -> &str {
        &self.config.failure_url
    }

    pub fn build_pay_request(
        &self,
        amount_paise: u64,
        merchant_transaction_id: String,
        merchant_user_id: String,
        mobile_number: Option<String>,
    ) -> PayRequestPayload {
        PayRequestPayload {
            merchant_id: self.config.merchant_id.clone(),
            merchant_transaction_id,
            merchant_user_id,
            amount: amount_paise,
            redirect_url: self.config.redirect_url.clone(),
            redirect_mode: "POST".to_string(),
            callback_url: self.config.callback_url.clone(),
            mobile_number,
            payment_instrument: PaymentInstrument {
                kind: "PAY_PAGE".to_string(),
            },
        }
    }

    pub fn pay_checksum(&self, encoded_payload: &str) -> SaltedChecksum {
        let input = PaySigningInput {
            encoded_payload,
            salt_key: self.config.salt_key.expose_secret(),
        };
        self.verifier
            .sign_salted(input.canonical_string(), self.config.salt_index)
    }

    pub fn status_checksum(&self, merchant_transaction_id: &str) -> SaltedChecksum {
        let input = StatusSigningInput {
            merchant_id: &self.config.merchant_id,
            merchant_transaction_id,
            salt_key: self.config.salt_key.expose_secret(),
        };
        self.verifier
            .sign_salted(input.canonical_string(), self.config.salt_index)
    }

    /// Check the `X-VERIFY` header of a server-to-server callback.
    pub fn verify_callback(&self, encoded_response: &str, x_verify: &str) -> bool {
        let input = CallbackSigningInput {
            encoded_response,
            salt_key: self.config.salt_key.expose_secret(),
        };
        let is_valid = self.verifier.verify_salted(
            input.canonical_string(),
            self.config.salt_index,
            x_verify,
        );

        crate::services::metrics::record_verification("phonepe", is_valid);

        if !is_valid {
            tracing::warn!("PhonePe callback checksum verification failed");
        }

        is_valid
    }

    /// Submit a pay request and return PhonePe's response.
    pub async fn initiate_payment(&self, payload: &PayRequestPayload) -> Result<PayResponse> {
        let encoded = encode_payload(payload)?;
        let checksum = self.pay_checksum(&encoded);
        let url = format!("{}{}", self.config.api_base_url, PAY_API_PATH);

        let response = self
            .client
            .post(&url)
            .header(X_VERIFY, checksum.to_string())
            .json(&PayRequestBody { request: &encoded })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, "PhonePe pay response");

        let parsed: Option<PayResponse> = serde_json::from_str(&body).ok();
        match parsed {
            Some(pay) if status.is_success() && pay.success && pay.redirect_url().is_some() => {
                tracing::info!(
                    merchant_transaction_id = %payload.merchant_transaction_id,
                    amount = payload.amount,
                    "PhonePe payment initiated"
                );
                Ok(pay)
            }
            Some(pay) => {
                tracing::error!(
                    status = %status,
                    code = %pay.code,
                    message = %pay.message,
                    "PhonePe payment initiation rejected"
                );
                Err(anyhow!("PhonePe error: {} - {}", pay.code, pay.message))
            }
            None => {
                tracing::error!(status = %status, "Unexpected PhonePe pay response");
                Err(anyhow!("Unexpected PhonePe response with status {}", status))
            }
        }
    }

    /// Poll the status of a transaction.
    ///
    /// PhonePe answers failed or pending payments with non-2xx statuses but
    /// a well-formed envelope; those are returned as `Ok`.
    pub async fn check_status(&self, merchant_transaction_id: &str) -> Result<StatusResponse> {
        if !is_valid_transaction_id(merchant_transaction_id) {
            return Err(anyhow!("Invalid merchant transaction id"));
        }

        let checksum = self.status_checksum(merchant_transaction_id);
        let url = format!(
            "{}{}/{}/{}",
            self.config.api_base_url,
            STATUS_API_PATH,
            self.config.merchant_id,
            merchant_transaction_id
        );

        let response = self
            .client
            .get(&url)
            .header(X_VERIFY, checksum.to_string())
            .header(X_MERCHANT_ID, &self.config.merchant_id)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        let parsed: StatusResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(status = %status, error = %e, "Unexpected PhonePe status response");
            anyhow!("Unexpected PhonePe status response with status {}", status)
        })?;

        tracing::info!(
            merchant_transaction_id = %merchant_transaction_id,
            code = %parsed.code,
            "PhonePe status fetched"
        );

        Ok(parsed)
    }
}
