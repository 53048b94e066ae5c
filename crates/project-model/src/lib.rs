//! Flipbook Project Model
//!
//! Defines the data contracts the export pipeline consumes:
//! - **Scene:** ordered pictures referencing stored frames by id
//! - **Export:** the per-invocation `ExportConfig` value object, modes,
//!   formats, and resolution choices
//! - **Capability:** the closed set of device/build feature tags
//!
//! Scenes reference frame bytes only through [`FrameId`]; the bytes live
//! in the blob store.

pub mod capability;
pub mod export;
pub mod scene;

pub use capability::*;
pub use export::*;
pub use flipbook_blob_store::FrameId;
pub use scene::*;
