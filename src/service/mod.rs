//! Service Layer
//!
//! The non-deterministic outer shell: real-time driving, authentication and
//! the admin console. All round logic stays in `game/`.

pub mod admin;
pub mod auth;
pub mod driver;

pub use admin::{AdminCapability, AdminConsole, AdminError};
pub use auth::{AuthConfig, AuthError, TokenClaims, validate_token};
pub use driver::EngineDriver;
