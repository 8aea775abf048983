//! # Diskspill Core
//!
//! Transparent fallback from in-memory to disk-backed operators for a pull-based,
//! batched query executor.
//!
//! An in-memory operator computes its result under a memory budget tracked by a
//! [`mem::MemoryMonitor`]. When that budget is exceeded, the [`exec::operators::DiskSpiller`]
//! wrapping it swaps in an equivalent disk-backed operator, replaying the batches the
//! in-memory operator had already buffered before resuming from the original inputs.
//! Neither upstream producers nor downstream consumers observe the substitution.
//!
//! <section class="warning">
//! <h3>Unstable!</h3>
//! This crate is an internal API. It does not adhere to semver and its API is free to
//! change between patch versions.
//! </section>

#[macro_use]
extern crate tracing;

#[macro_use]
mod mac;

pub mod cnf;
pub mod err;
pub mod exec;
pub mod mem;
pub mod val;

pub use err::{Error, Result};
