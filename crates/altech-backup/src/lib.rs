//! Backup and restore of protected slots.
//!
//! Snapshots carry each slot's raw stored string, encrypted or legacy
//! plaintext, exactly as found. Nothing here decrypts.

pub mod manager;
pub mod snapshot;
