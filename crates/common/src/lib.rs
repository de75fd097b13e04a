//! Shared error plumbing used across the hostex bridge crates.

pub mod error;

pub use error::FromMessage;
