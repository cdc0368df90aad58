//! Authentication module
//!
//! Supports: Bearer, Basic, and the inventory service's offline token.
//!
//! The `Authenticator` applies credentials to requests and manages the
//! access-token cache for the offline-token exchange.

mod authenticator;
mod types;

pub use authenticator::Authenticator;
pub use types::{AuthConfig, CachedToken};
