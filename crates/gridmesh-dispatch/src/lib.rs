//! Wires the registry, partitioners and resource layer into one node-side
//! dispatch surface.
//!
//! A task is announced, a partitioner is opened for it, workers pull unit
//! ranges and push results back, each delivered result opens a verification
//! window, and a periodic sweep ages headers and expires unconfirmed
//! verifications. Everything is dependency-injected; there is no hidden
//! process-wide state.

pub mod dispatcher;
pub mod error;

pub use dispatcher::{DispatchConfig, Dispatcher, SweepReport};
pub use error::{DispatchError, Result};
