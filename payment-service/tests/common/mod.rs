#![allow(dead_code)]

use payment_service::config::{
    Config, ObservabilityConfig, PhonePeConfig, RazorpayConfig, ServerConfig,
};
use payment_service::startup::Application;
use secrecy::Secret;
use std::time::Duration;
use wiremock::MockServer;

pub const RAZORPAY_KEY_ID: &str = "rzp_test_key_id";
pub const RAZORPAY_KEY_SECRET: &str = "test_key_secret";
pub const RAZORPAY_WEBHOOK_SECRET: &str = "test_webhook_secret";
pub const PHONEPE_MERCHANT_ID: &str = "PGTESTPAYUAT";
pub const PHONEPE_SALT_KEY: &str = "test-salt-key";
pub const PHONEPE_SALT_INDEX: u32 = 1;
pub const SUCCESS_URL: &str = "http://frontend.test/payment/success";
pub const FAILURE_URL: &str = "http://frontend.test/payment/failure";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    /// Stands in for both Razorpay and PhonePe.
    pub gateway: MockServer,
    pub client: reqwest::Client,
}

pub fn test_config(gateway_uri: &str) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Random port
        },
        razorpay: Some(RazorpayConfig {
            key_id: RAZORPAY_KEY_ID.to_string(),
            key_secret: Secret::new(RAZORPAY_KEY_SECRET.to_string()),
            webhook_secret: Some(Secret::new(RAZORPAY_WEBHOOK_SECRET.to_string())),
            api_base_url: gateway_uri.to_string(),
        }),
        phonepe: Some(PhonePeConfig {
            merchant_id: PHONEPE_MERCHANT_ID.to_string(),
            salt_key: Secret::new(PHONEPE_SALT_KEY.to_string()),
            salt_index: PHONEPE_SALT_INDEX,
            api_base_url: gateway_uri.to_string(),
            redirect_url: "http://127.0.0.1/phonepe/redirect".to_string(),
            callback_url: "http://127.0.0.1/phonepe/callback".to_string(),
            success_url: SUCCESS_URL.to_string(),
            failure_url: FAILURE_URL.to_string(),
        }),
        gateway_timeout: Duration::from_secs(5),
        observability: ObservabilityConfig {
            log_level: "info".to_string(),
            otlp_endpoint: None,
        },
        service_name: "payment-service-test".to_string(),
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_with(customize: impl FnOnce(&mut Config)) -> Self {
        let gateway = MockServer::start().await;

        let mut config = test_config(&gateway.uri());
        customize(&mut config);

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to build HTTP client");

        // Wait for HTTP server to be ready by polling health endpoint
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            gateway,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn post_json(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }
}
