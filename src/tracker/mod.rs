//! Git integration for the run loop.

pub mod git;

pub use git::GitTracker;
