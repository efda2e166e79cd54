pub mod asset_handlers;
pub mod health_handlers;
pub mod scan_handlers;
pub mod settings_handlers;
pub mod template_handlers;

pub use health_handlers::{health_check, health_check_simple, readiness_check, liveness_check};
