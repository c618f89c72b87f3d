//! Typed requests accepted by the core. The external HTTP layer
//! deserializes authenticated calls into these types; the core
//! resolves them against process state.

pub mod execute;
pub mod read;
pub mod write;
