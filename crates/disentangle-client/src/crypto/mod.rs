//! Cryptographic primitives used to sign outgoing requests.
//!
//! - Ed25519 key generation, signing, and verification
//! - Request nonces from the operating system's random source

pub mod keys;
pub mod random;
pub mod signing;
