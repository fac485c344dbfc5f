//! Reltag-Store: Reference Store Backend for reltag
//!
//! This crate is the only seam through which reltag touches the shared
//! commit-graph reference store. It exposes a narrow async port and two
//! implementations of it.
//!
//! ## Layer 0 - References
//!
//! Focus: name → commit bindings, create-vs-move semantics, and
//! propagation of a single reference to the remote replica.
//!
//! ## Key Components
//!
//! - `ReferenceStore`: The port (resolve, create-or-move, list, remote sync)
//! - `GitReferenceStore`: Backend driving the `git` CLI against a work tree
//! - `fakes::MemoryReferenceStore`: In-memory store with a simulated remote
//!
//! ## Consistency
//!
//! The remote offers no transactions and no compare-and-swap. Callers get
//! last-write-wins semantics; any retry policy lives above this layer.

mod error;
pub mod fakes;
mod git_store;
pub mod reference_store;

pub use error::StoreError;
pub use git_store::{GitReferenceStore, DEFAULT_GIT_TIMEOUT};
pub use reference_store::{CommitRef, ReferenceStore, StoreResult};
