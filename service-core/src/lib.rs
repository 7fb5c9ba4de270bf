//! service-core: shared infrastructure for the payment gateway proxy.
pub mod error;
pub mod integrity;
pub mod middleware;
pub mod observability;

pub use axum;
pub use secrecy;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tower_http;
pub use tracing;
pub use validator;
