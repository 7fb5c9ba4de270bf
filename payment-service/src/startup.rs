//! Application startup and lifecycle management.

use crate::config::Config;
use crate::handlers;
use crate::services::{PhonePeClient, RazorpayClient};
use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics_middleware, request_id_middleware, security_headers_middleware, REQUEST_ID_HEADER,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub razorpay: Option<RazorpayClient>,
    pub phonepe: Option<PhonePeClient>,
}

impl AppState {
    /// Build gateway clients from configuration. Empty secrets are fatal.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.gateway_timeout)
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("HTTP client: {}", e)))?;

        let razorpay = config
            .razorpay
            .clone()
            .map(|c| RazorpayClient::new(c, http.clone()))
            .transpose()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Razorpay: {}", e)))?;

        let phonepe = config
            .phonepe
            .clone()
            .map(|c| PhonePeClient::new(c, http.clone()))
            .transpose()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("PhonePe: {}", e)))?;

        Ok(Self {
            config,
            razorpay,
            phonepe,
        })
    }

    pub fn razorpay(&self) -> Result<&RazorpayClient, AppError> {
        self.razorpay
            .as_ref()
            .ok_or_else(|| AppError::ServiceUnavailable("Razorpay is not configured".to_string()))
    }

    pub fn phonepe(&self) -> Result<&PhonePeClient, AppError> {
        self.phonepe
            .as_ref()
            .ok_or_else(|| AppError::ServiceUnavailable("PhonePe is not configured".to_string()))
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        // Razorpay endpoints
        .route("/create-order", post(handlers::razorpay::create_order))
        .route("/verify-payment", post(handlers::razorpay::verify_payment))
        .route("/webhooks/razorpay", post(handlers::razorpay::webhook))
        // PhonePe endpoints
        .route("/phonepe/pay", post(handlers::phonepe::pay))
        .route(
            "/phonepe/status/:transaction_id",
            get(handlers::phonepe::status),
        )
        .route("/phonepe/redirect", post(handlers::phonepe::redirect))
        .route("/phonepe/callback", post(handlers::phonepe::callback))
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let state = AppState::new(config.clone())?;

        match &state.razorpay {
            Some(razorpay) => tracing::info!(
                key_id = %razorpay.key_id(),
                webhooks = razorpay.webhook_enabled(),
                "Razorpay client initialized"
            ),
            None => tracing::info!("Razorpay disabled"),
        }
        match &state.phonepe {
            Some(phonepe) => {
                tracing::info!(merchant_id = %phonepe.merchant_id(), "PhonePe client initialized")
            }
            None => tracing::info!("PhonePe disabled"),
        }

        let host: std::net::IpAddr = config.server.host.parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Invalid host {:?}: {}",
                config.server.host,
                e
            ))
        })?;

        // Port 0 = random port for testing
        let addr = SocketAddr::new(host, config.server.port);
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Payment service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }
}
