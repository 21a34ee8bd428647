pub mod audit;
pub mod config;
pub mod error;
pub mod gateway;
pub mod git;
pub mod github;
pub mod security;

// Re-export commonly used types for convenience
pub use config::Config;
pub use error::{GatewayError, GatewayResult};
pub use gateway::{GatewayState, router};
