//! Worker process for distributed `strest` runs.
//!
//! The worker listens for control signals from a console or supervising
//! agent, drives a pool of execution threads through a start, drain, and
//! exit lifecycle, and reports per-test statistics back to the console.
//! The communication substrate is plain threads and blocking sockets:
//! a resource pool of accepted connections polled by a fixed thread pool,
//! feeding a shutdown-aware message queue.
//!
//! The primary user-facing interface is the `strest-worker` binary; the
//! library exposes the same building blocks for embedding and testing.
pub mod args;
pub mod communication;
pub mod config;
pub mod error;
pub mod process;
pub mod script;
pub mod shutdown;
