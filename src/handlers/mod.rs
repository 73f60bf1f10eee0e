mod generate;
mod health;
mod metrics;

pub use generate::{ClientAddr, generate_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;
