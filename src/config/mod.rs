//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overrides)
//!     → validation.rs (semantic checks)
//!     → ResilienceConfig (validated, immutable)
//!     → copied into each CircuitBreaker / RetryingClient at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; instances never see later changes
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::BreakerConfig;
pub use schema::ObservabilityConfig;
pub use schema::ResilienceConfig;
pub use schema::ShopClientConfig;
