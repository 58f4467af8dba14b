// Library exports for testing
pub mod api;
pub mod config;
pub mod disclosure;
pub mod errors;
pub mod guardian;
pub mod metrics;
pub mod response;
