//! Tapo local protocol support: KLAP and the older secure passthrough.

pub mod client;
pub mod klap;
pub mod passthrough;

#[cfg(test)]
pub(crate) mod fake;

pub use client::TapoClient;
pub use klap::{CipherError, KlapCipher};
pub use passthrough::{KeyPair, PassthroughCipher, PassthroughError};
