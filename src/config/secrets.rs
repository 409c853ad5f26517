//! Secret handling utilities.
//!
//! Re-exports the secrecy types used for database credentials.

pub use secrecy::{ExposeSecret, SecretString};
