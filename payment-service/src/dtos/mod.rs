use serde::{Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationError};

/// Accepts `500`, `500.5` or `"500"`; anything else becomes `None` so the
/// handler can answer with a plain "Invalid amount".
pub fn amount_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Some(n),
        Some(Raw::Text(s)) => s.trim().parse::<f64>().ok(),
        Some(Raw::Other(_)) | None => None,
    }
    .filter(|n| n.is_finite()))
}

/// Largest amount accepted in paise (one crore rupees).
pub const MAX_AMOUNT_MINOR_UNITS: u64 = 1_000_000_000;

/// Rupees to paise, rounding to the nearest paisa. `None` unless the result
/// is between one paisa and [`MAX_AMOUNT_MINOR_UNITS`].
pub fn to_minor_units(amount: f64) -> Option<u64> {
    let paise = (amount * 100.0).round();
    if paise >= 1.0 && paise <= MAX_AMOUNT_MINOR_UNITS as f64 {
        Some(paise as u64)
    } else {
        None
    }
}

fn validate_mobile_number(value: &str) -> Result<(), ValidationError> {
    if value.len() == 10 && value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("mobile_number"))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct PhonePePayRequest {
    /// Amount in rupees.
    #[serde(default, deserialize_with = "amount_from_number_or_string")]
    #[validate(
        required(message = "Invalid amount"),
        range(exclusive_min = 0.0, message = "Invalid amount")
    )]
    pub amount: Option<f64>,

    #[validate(length(min = 1, max = 36))]
    pub merchant_user_id: Option<String>,

    #[validate(custom(function = "validate_mobile_number"))]
    pub mobile_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PhonePePayResponse {
    pub success: bool,
    pub merchant_transaction_id: String,
    pub redirect_url: String,
}

#[derive(Debug, Serialize)]
pub struct PhonePeStatusResponse {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub state: Option<String>,
    pub transaction_id: Option<String>,
    pub merchant_transaction_id: String,
    /// Amount in paise as reported by PhonePe.
    pub amount: Option<u64>,
}

/// Form PhonePe posts to the redirect URL with `redirectMode = POST`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhonePeRedirectForm {
    pub code: Option<String>,
    pub merchant_id: String,
    pub transaction_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PhonePeCallbackBody {
    pub response: String,
}
