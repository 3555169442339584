//! Shared types and error definitions used across all anonka crates.

pub mod error;
pub mod types;

pub use {
    error::{Error, FromMessage, Result},
    types::{Role, UserId, UserRecord},
};
