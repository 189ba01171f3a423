//! Daemon subsystem: the worker-thread run loop and OS signal handling.

#[cfg(feature = "daemon")]
pub mod loop_main;
#[cfg(feature = "daemon")]
pub mod signals;
