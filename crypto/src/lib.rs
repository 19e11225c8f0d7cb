//! modux Cryptography Module
//!
//! Reversible transforms applied to serialized state before it reaches a
//! persistence backend:
//! - XOR keystream + Base64 armor (`XorCipher`)
//!
//! `XorCipher` is obfuscation, not confidentiality. Anything needing real
//! protection should implement [`StateCipher`] with an authenticated cipher.

pub mod cipher;

pub use cipher::*;
