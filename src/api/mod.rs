//! Fieldcalc HTTP API
//!
//! Thin JSON wrapper over the engine for services that cannot link the
//! library. Run with `fieldcalc-server`.

pub mod handlers;
pub mod server;

pub use server::{router, run_api_server};
