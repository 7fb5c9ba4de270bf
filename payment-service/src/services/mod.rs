pub mod metrics;
pub mod phonepe;
pub mod razorpay;

pub use metrics::{get_metrics, init_metrics};
pub use phonepe::PhonePeClient;
pub use razorpay::RazorpayClient;
