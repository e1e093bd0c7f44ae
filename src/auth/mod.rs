//! Request identity: credential decoding, legacy sessions and resolution.

pub mod cache;
pub mod claims;
pub mod credentials;
pub mod legacy;
pub mod resolver;

use std::sync::Arc;

pub use cache::{CacheEntry, RefreshMode};
pub use claims::{decode_session_token, ExternalClaim};
pub use credentials::RequestCredentials;
pub use legacy::LegacySessionStore;
pub use resolver::{SessionResolution, SessionResolver};

/// Clock shared across request handlers
pub type SharedClock = Arc<dyn mockable::Clock + Send + Sync>;
