//! Core contracts for the Altech data-protection layer: the raw slot storage
//! primitive, the registry of backed-up slots, and the user-facing signals
//! (toast, confirm, reload) injected by the host application.

pub mod registry;
pub mod signals;
pub mod storage;
