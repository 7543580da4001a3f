mod app;
mod communication;
mod config;
mod validation;

#[cfg(test)]
mod test_support;

pub use app::{AppError, AppResult};
pub use communication::{CommunicationError, ShutdownError};
pub use config::ConfigError;
pub use validation::ValidationError;
