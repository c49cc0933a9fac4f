//! Concurrent spam-triage pipeline.
//!
//! Every run flows strictly left to right through five fixed stages:
//! 1. seeding — input emails preloaded onto the first channel
//! 2. `resolve` — concurrent lookups, deduplicated by identity
//! 3. `list` — batched message listing
//! 4. `classify` — bounded worker pool calling the spam classifier
//! 5. `combine` — full-stream buffer, stable sort, formatted report lines
//!
//! Stages communicate only through typed point-to-point channels; the sole
//! shared mutable state is the resolver's dedup set. Failures ride a
//! dedicated side channel and end up in the report next to the lines.

pub(crate) mod classify;
pub(crate) mod combine;
pub mod executor;
pub(crate) mod list;
pub(crate) mod resolve;
pub mod state;
pub mod types;

pub use executor::Pipeline;
