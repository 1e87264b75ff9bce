//! Storage side of the data-protection layer: a file-backed slot store with a
//! quota, the quota-aware persistence gateway, and helpers composing the
//! gateway with the record codec.

pub mod file_store;
pub mod gateway;
pub mod generation;
pub mod protected;
