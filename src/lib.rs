//! # mend
//!
//! Best-effort, idempotent source patching for build pipelines.
//!
//! `mend` finds a file among the places a dependency may have put it,
//! rewrites it with a declarative rule table, backs up the original once,
//! and checks the result for a post-condition marker. Nothing it does is
//! allowed to fail the surrounding build: problems end up in a diagnostics
//! directory and in the narration.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │ Locator  │──▶│ Rewrite  │──▶│  Backup  │──▶│ Verifier │
//! │ + Fetch  │   │  Engine  │   │ + Commit │   │          │
//! └──────────┘   └──────────┘   └──────────┘   └────┬─────┘
//!                                                   ▼
//!                                            ┌─────────────┐
//!                                            │ Diagnostics │
//!                                            └─────────────┘
//! ```
//!
//! The engine itself (rules, brace balancing, markers, reports) lives in
//! the I/O-free `mend-core` crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and validation |
//! | [`site`] | Installed-package root discovery |
//! | [`locate`] | Candidate locator |
//! | [`fetch`] | Remote fallback for known-good sources |
//! | [`commit`] | Backup and atomic write |
//! | [`verify`] | Marker verification of files on disk |
//! | [`diagnostics`] | Diagnostics directory |
//! | [`patch`] | Run orchestration |
//! | [`narrate`] | Human / JSON narration |
//! | [`inspect`] | Candidate inspection |
//! | [`targets`] | Target status listing |

pub mod commit;
pub mod config;
pub mod diagnostics;
pub mod fetch;
pub mod inspect;
pub mod locate;
pub mod narrate;
pub mod patch;
pub mod site;
pub mod targets;
pub mod verify;
