//! Flipbook Blob Store
//!
//! Holds raw frame bytes keyed by store-assigned [`FrameId`]s and serves
//! them two ways:
//!
//! ```text
//!                 ┌── get_blob ──────────── export pipeline (re-encode)
//! persistence ────┤
//!                 └── get_blob_reference ── ReferenceCache ── preview UI
//! ```
//!
//! The id is the only cross-referencing key; records know nothing about
//! the scenes that use them.

pub mod cache;
pub mod persistence;
pub mod record;
pub mod store;

pub use cache::*;
pub use persistence::*;
pub use record::*;
pub use store::*;
