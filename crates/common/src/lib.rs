//! Common types shared by the Sesame SSO crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
