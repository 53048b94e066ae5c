//! Flipbook Export Engine
//!
//! Turns a scene of stored frames into a deliverable: an encoded video,
//! a folder of frames, or an upload payload queued for background sync.
//!
//! # Pipeline Architecture
//!
//! ```text
//! capabilities ── negotiate mode/format
//!                        │
//! blob store ─── resolve resolution (16:9, never upscaled)
//!                        │
//! path prompt ─── output file / folder (send: none)
//!                        │
//! scene ──────── expand frames (auto padding, then repeats)
//!                        │
//!                 prepare frames (convert once per id) ── frame phase
//!                        │
//!                        ▼
//!                    Encoder ─────── progress channel ── encode phase
//!                        │
//!                        ▼
//!                   ExportReport
//! ```

pub mod convert;
pub mod encoder;
pub mod expand;
pub mod ffmpeg;
pub mod negotiate;
pub mod pipeline;
pub mod progress;
pub mod prompt;
pub mod public_code;
pub mod resolution;

pub use convert::*;
pub use encoder::*;
pub use expand::*;
pub use ffmpeg::*;
pub use negotiate::*;
pub use pipeline::*;
pub use progress::*;
pub use prompt::*;
pub use public_code::*;
pub use resolution::*;
