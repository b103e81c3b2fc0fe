//! Pure domain logic for the reel generation pipeline.
//!
//! Nothing in this crate performs I/O. Job kinds and keys, the task-name
//! codec, chapter asset state, the dependency gate and the per-kind job
//! tracker all live here so they can be exercised synchronously.

pub mod assets;
pub mod codec;
pub mod error;
pub mod gate;
pub mod job;
pub mod task;
pub mod tracker;
pub mod types;
