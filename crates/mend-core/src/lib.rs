//! # mend core
//!
//! I/O-free logic shared by the `mend` binary: the rewrite rule table,
//! the structural brace rebalancer, the rewrite engine, marker scanning,
//! run reports, and the per-stage error taxonomy.
//!
//! Nothing in this crate touches the filesystem, spawns processes, or
//! talks to the network. Every function is a pure transformation of its
//! inputs, which is what makes the idempotence properties testable in
//! isolation.

pub mod balance;
pub mod engine;
pub mod error;
pub mod marker;
pub mod report;
pub mod rule;
