//! docdelta library crate.
//!
//! The primary interface is the `docdelta` binary. This lib.rs exposes the
//! apply engine and its components so integration tests (and other tools)
//! can drive them without going through the CLI.
//!
//! The I/O-free half (diffing, section patching, batch parsing, prompt
//! rendering) lives in the `docdelta_core` crate.

pub mod apply;
pub mod atomic;
pub mod backup;
pub mod changelog;
pub mod config;
pub mod error;
pub mod failpoints;
pub mod format;
pub mod lock;
pub mod scan;
pub mod state;
pub mod telemetry;

pub use apply::{ApplyOptions, ApplyPhase, ApplyReport, ChangeReport, Updater};
pub use config::{DocdeltaConfig, Settings};
pub use error::DocdeltaError;
