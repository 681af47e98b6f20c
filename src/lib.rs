//! # Image Worker
//!
//! A batch worker that takes one source image, applies a configured list of
//! named operations to it, and publishes every derivative to an object store.
//!
//! # Architecture: One Source, Many Operations
//!
//! ```text
//! source URL ──fetch──▶ local copy
//!                          │  (reopened for every operation)
//!                          ▼
//!     registry lookup ─▶ transform ─▶ post-process ─▶ encode ─▶ publish
//!
//!     op = "tile":  split into a grid ─▶ encode each cell ─▶ [merge] ─▶ publish
//! ```
//!
//! Operations are declarative descriptors (`{"op": "thumbnail", "width": 100}`)
//! read from a JSON or TOML config. Each one starts from the untouched source,
//! so the order of the list never changes what an individual operation
//! produces.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Pure-Rust pixel work: handles, codecs, transforms, registry, tiling |
//! | [`operation`] | Operation descriptors and their output directives |
//! | [`config`] | Worker config loading and validation |
//! | [`source`] | Fetching the source image into the work directory |
//! | [`publish`] | Bucket uploads, public URLs, version ledger |
//! | [`pipeline`] | The driver tying the above together, with progress events |
//! | [`output`] | CLI output formatting for progress events and run summaries |
//!
//! # Design Decisions
//!
//! ## Closed Transform Catalog
//!
//! Transforms are plain `fn` pointers in a name-keyed table built once at
//! start-up. There is no plugin loading and no fallback: an unknown name is
//! an error the run reports and moves past.
//!
//! ## Move-Only Handles
//!
//! A transform takes its [`imaging::ImageHandle`] by value and returns a new
//! one. Callers cannot keep using a handle after handing it over, so no
//! transform can observe another's intermediate state.
//!
//! ## Failures Stay Local
//!
//! A bad operation or a failed upload is reported and the run continues with
//! the next item. Only a missing source image stops a run, since no operation
//! could succeed without it.

pub mod config;
pub mod imaging;
pub mod operation;
pub mod output;
pub mod pipeline;
pub mod publish;
pub mod source;

#[cfg(test)]
pub(crate) mod test_helpers;
