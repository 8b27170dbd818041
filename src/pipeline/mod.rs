//! Building blocks the request lifecycle is assembled from.
//!
//! ## Data Flow
//!
//! ```text
//! workspace ──▶ classify ──▶ chain ──▶ runner ──▶ validate
//! (scratch)    (profile)    (order)   (process)   (output)
//! ```
//!
//! 1. [`workspace`]: per-request scratch namespace, swept on every exit path
//! 2. [`classify`]: `pdfinfo`/`pdftotext` heuristics; never fails, falls
//!    back to a size-only profile
//! 3. [`chain`]: runs strategies in order until one output validates
//! 4. [`runner`]: spawns a tool with argv, timeout, cancellation and
//!    bounded capture; the seam tests replace
//! 5. [`validate`]: size floor, magic bytes and encryption markers

pub mod chain;
pub mod classify;
pub mod runner;
pub mod validate;
pub mod workspace;
