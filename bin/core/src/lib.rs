//! The orchestrator core as a library. The (external) HTTP layer
//! embeds this crate and resolves [treeos_client::api] requests
//! against it; the `core` binary wires the same pieces into a
//! standalone daemon.

#[macro_use]
extern crate tracing;

pub mod api;
pub mod config;
pub mod engine;
pub mod models;
pub mod ops;
pub mod runtime;
pub mod startup;
pub mod state;
pub mod validate;
