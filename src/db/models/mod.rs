//! Database models split into domain-specific modules.

pub mod common;
pub mod organisation;
pub mod team;
pub mod user;

pub use common::*;
pub use organisation::*;
pub use team::*;
pub use user::*;
