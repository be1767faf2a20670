//! # vadkit-core
//!
//! Voice activity detection engine bindings and frame streaming pipeline.
//!
//! ## Architecture
//!
//! ```text
//! DynamicBinding::load(path, profile)          StubBinding (tests, demos)
//!            └──────────────┬──────────────────────────┘
//!                     Arc<dyn Binding>
//!                           │
//!        ArenaSizing::probe (bounded-memory only)
//!                           │
//!                       VadEngine ◄── explain_failure (error stack)
//!                           │
//! AudioSource ──► pipeline::run ──► FrameSink (one FrameEvent per frame)
//!   (WAV, mic)        │
//!                RtfProfiler ──► StreamSummary
//! ```
//!
//! Unsafe code is confined to [`binding::dynamic`], which crosses into the
//! loaded engine module.

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod binding;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod events;
pub mod status;
pub mod vad;

// Convenience re-exports for downstream crates
pub use audio::{AudioSource, MemorySource, SourceFormat};
pub use binding::{dynamic::DynamicBinding, stub::StubBinding, Binding, Profile};
pub use engine::{
    arena::{ArenaSizing, MemoryArena, DEFAULT_PRELIMINARY_SIZE},
    list_hardware_devices,
    pipeline::{StopToken, StreamContext},
    profiler::RtfProfiler,
    VadEngine,
};
pub use error::{EngineFailure, Result, VadError};
pub use events::{EndReason, FrameEvent, StreamSummary};
pub use status::Status;
