//! Device-bound key derivation and the AES-GCM record codec.
//! Keys come from a persisted per-device secret stretched with PBKDF2; records
//! that cannot be decrypted fall back to plain JSON for backward compatibility.

pub mod codec;
pub mod kdf;
pub mod secret;
