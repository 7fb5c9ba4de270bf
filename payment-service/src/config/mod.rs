use dotenvy::dotenv;
use secrecy::Secret;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Errors that abort startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("No payment gateway configured: set RAZORPAY_KEY_ID or PHONEPE_MERCHANT_ID")]
    NoGatewayConfigured,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub razorpay: Option<RazorpayConfig>,
    pub phonepe: Option<PhonePeConfig>,
    pub gateway_timeout: Duration,
    pub observability: ObservabilityConfig,
    pub service_name: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub webhook_secret: Option<Secret<String>>,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct PhonePeConfig {
    pub merchant_id: String,
    pub salt_key: Secret<String>,
    pub salt_index: u32,
    pub api_base_url: String,
    /// Where PhonePe sends the customer's browser after checkout.
    pub redirect_url: String,
    /// Server-to-server notification endpoint registered with PhonePe.
    pub callback_url: String,
    pub success_url: String,
    pub failure_url: String,
}

#[derive(Clone, Debug)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

const DEFAULT_RAZORPAY_API_BASE_URL: &str = "https://api.razorpay.com/v1";
const DEFAULT_PHONEPE_API_BASE_URL: &str = "https://api-preprod.phonepe.com/apis/pg-sandbox";

impl Config {
    /// Load configuration from the process environment (and `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        // Secrets are signing keys: blank means unset, otherwise kept byte for byte.
        let secret = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = var("PAYMENT_SERVICE_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match var("PORT").or_else(|| var("PAYMENT_SERVICE_PORT")) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                value: raw,
            })?,
            None => 5000,
        };

        let razorpay = match var("RAZORPAY_KEY_ID") {
            Some(key_id) => Some(RazorpayConfig {
                key_id,
                key_secret: Secret::new(
                    secret("RAZORPAY_KEY_SECRET")
                        .ok_or(ConfigError::MissingRequired("RAZORPAY_KEY_SECRET"))?,
                ),
                webhook_secret: secret("RAZORPAY_WEBHOOK_SECRET").map(Secret::new),
                api_base_url: var("RAZORPAY_API_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_RAZORPAY_API_BASE_URL.to_string()),
            }),
            None if secret("RAZORPAY_KEY_SECRET").is_some() => {
                return Err(ConfigError::MissingRequired("RAZORPAY_KEY_ID"));
            }
            None => None,
        };

        let phonepe = match var("PHONEPE_MERCHANT_ID") {
            Some(merchant_id) => {
                let salt_index = match var("PHONEPE_SALT_INDEX") {
                    Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                        key: "PHONEPE_SALT_INDEX",
                        value: raw,
                    })?,
                    None => 1,
                };

                Some(PhonePeConfig {
                    merchant_id,
                    salt_key: Secret::new(
                        secret("PHONEPE_SALT_KEY")
                            .ok_or(ConfigError::MissingRequired("PHONEPE_SALT_KEY"))?,
                    ),
                    salt_index,
                    api_base_url: var("PHONEPE_API_BASE_URL")
                        .unwrap_or_else(|| DEFAULT_PHONEPE_API_BASE_URL.to_string()),
                    redirect_url: var("PHONEPE_REDIRECT_URL").unwrap_or_else(|| {
                        format!("http://localhost:{}/phonepe/redirect", port)
                    }),
                    callback_url: var("PHONEPE_CALLBACK_URL").unwrap_or_else(|| {
                        format!("http://localhost:{}/phonepe/callback", port)
                    }),
                    success_url: var("PHONEPE_SUCCESS_URL")
                        .unwrap_or_else(|| "http://localhost:3000/payment/success".to_string()),
                    failure_url: var("PHONEPE_FAILURE_URL")
                        .unwrap_or_else(|| "http://localhost:3000/payment/failure".to_string()),
                })
            }
            None if secret("PHONEPE_SALT_KEY").is_some() => {
                return Err(ConfigError::MissingRequired("PHONEPE_MERCHANT_ID"));
            }
            None => None,
        };

        if razorpay.is_none() && phonepe.is_none() {
            return Err(ConfigError::NoGatewayConfigured);
        }

        let gateway_timeout = match var("GATEWAY_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "GATEWAY_TIMEOUT_SECS",
                        value: raw,
                    });
                }
            },
            None => Duration::from_secs(30),
        };

        Ok(Self {
            server: ServerConfig { host, port },
            razorpay,
            phonepe,
            gateway_timeout,
            observability: ObservabilityConfig {
                log_level: var("LOG_LEVEL")
                    .unwrap_or_else(|| "info,payment_service=debug".to_string()),
                otlp_endpoint: var("OTLP_ENDPOINT"),
            },
            service_name: "payment-service".to_string(),
        })
    }
}
