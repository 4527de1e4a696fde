//! This module exports a minimal message-passing API, which is encapsulated
//! by a `Communicator` trait. Implementors only need to write `send` and
//! `recv` operations for a given transport layer; the trait then provides
//! default implementations for paired send-receive, broadcast, reduce, and
//! reduce-all operations. Two transports are included: crossbeam channels
//! between threads of one process, and a pure-Rust TCP transport between
//! processes.
//!

mod backoff;
pub mod channel;
pub mod comm;
pub mod mailbox;
pub mod tcp;
pub mod util;
