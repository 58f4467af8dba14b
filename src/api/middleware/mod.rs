pub mod error_handler;
pub mod logging;

pub use error_handler::{error_handler, AppError, ErrorHandler};
pub use logging::logging_middleware;
