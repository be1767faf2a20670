//! `VadEngine`: one engine instance and its lifecycle.
//!
//! ## Lifecycle
//!
//! ```text
//! VadEngine::new(binding, key, device)        desktop build
//! VadEngine::bounded(binding, key, size)      bounded-memory build (probe + arena)
//!     └─► process(frame) → probability        any number of times, one frame each
//!         └─► destroy()  → arena handed back  exactly once (or on drop)
//! ```
//!
//! The engine holds its binding behind an `Arc`, so the loaded module can
//! never be released while an instance is alive. Every failing engine call is
//! explained through the error stack before the error is returned.
//!
//! ## Threading
//!
//! `VadEngine` is `Send` but not `Sync`: `process` takes `&mut self`, so one
//! instance is never driven from two threads at once. Independent instances
//! may run on separate threads.

pub mod arena;
pub mod pipeline;
pub mod profiler;
pub(crate) mod report;

use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::{
    binding::{Binding, InitTarget, Profile, RawHandle},
    error::{EngineFailure, Result, VadError},
    status::Status,
};
use arena::{ArenaSizing, MemoryArena};
use report::explain_failure;

/// Inference device selector used when none is given.
pub const DEFAULT_DEVICE: &str = "best";

/// A live engine instance.
pub struct VadEngine {
    binding: Arc<dyn Binding>,
    /// `None` only after `destroy` has run.
    handle: Option<RawHandle>,
    /// Bounded-memory builds: the arena the instance lives in.
    arena: Option<MemoryArena>,
    frame_length: usize,
    sample_rate: u32,
    version: String,
}

impl VadEngine {
    /// Construct an instance on a desktop engine build.
    ///
    /// `device` selects the inference device (`"best"`, `"cpu"`, `"cpu:4"`,
    /// `"gpu:0"`, ...); `None` means [`DEFAULT_DEVICE`].
    ///
    /// # Errors
    /// - `VadError::InvalidArgument` for a credential or device containing NUL.
    /// - `VadError::Unsupported` on a bounded-memory build.
    /// - The engine status with its error stack (invalid credential,
    ///   activation refused or limited, unknown device, ...).
    pub fn new(binding: Arc<dyn Binding>, credential: &str, device: Option<&str>) -> Result<Self> {
        if binding.profile() != Profile::Desktop {
            return Err(VadError::Unsupported {
                operation: "device construction",
                profile: binding.profile(),
            });
        }
        check_no_nul("credential", credential)?;
        check_constants(binding.as_ref())?;
        let device = device.unwrap_or(DEFAULT_DEVICE);
        check_no_nul("device", device)?;

        let handle = binding
            .init(credential, InitTarget::Device(device))
            .map_err(|status| explain_failure(binding.as_ref(), status, "engine construction"))?;

        info!(device, "engine instance constructed");
        Ok(Self::from_parts(binding, handle, None))
    }

    /// Construct an instance inside a caller-provided arena on a
    /// bounded-memory build. The arena is owned by the engine until
    /// [`VadEngine::destroy`] hands it back.
    pub fn with_arena(
        binding: Arc<dyn Binding>,
        credential: &str,
        mut arena: MemoryArena,
    ) -> Result<Self> {
        if binding.profile() != Profile::BoundedMemory {
            return Err(VadError::Unsupported {
                operation: "arena construction",
                profile: binding.profile(),
            });
        }
        check_no_nul("credential", credential)?;
        check_constants(binding.as_ref())?;

        let handle = binding
            .init(credential, InitTarget::Arena(&mut arena))
            .map_err(|status| explain_failure(binding.as_ref(), status, "engine construction"))?;

        info!(arena_bytes = arena.len(), "engine instance constructed in arena");
        Ok(Self::from_parts(binding, handle, Some(arena)))
    }

    /// Probe the arena requirement with a `preliminary_size` scratch arena,
    /// allocate exactly that much, and construct the instance in it.
    pub fn bounded(
        binding: Arc<dyn Binding>,
        credential: &str,
        preliminary_size: usize,
    ) -> Result<Self> {
        let sizing = ArenaSizing::probe(binding.as_ref(), preliminary_size)?;
        let arena = sizing.allocate()?;
        Self::with_arena(binding, credential, arena)
    }

    /// Compute the voice probability of one frame of 16-bit mono PCM at
    /// [`VadEngine::sample_rate`].
    ///
    /// # Errors
    /// - `VadError::FrameLength` if `pcm.len() != frame_length()`; the
    ///   engine is not called.
    /// - The engine status with its error stack on processing failure.
    /// - A `RUNTIME_ERROR` failure if the engine reports a NaN or infinite
    ///   probability.
    pub fn process(&mut self, pcm: &[i16]) -> Result<f32> {
        if pcm.len() != self.frame_length {
            return Err(VadError::FrameLength {
                expected: self.frame_length,
                actual: pcm.len(),
            });
        }

        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| VadError::InvalidArgument("engine already destroyed".into()))?;
        let probability = self
            .binding
            .process(handle, pcm)
            .map_err(|status| explain_failure(self.binding.as_ref(), status, "frame processing"))?;

        if !probability.is_finite() {
            warn!(%probability, "engine returned a non-finite probability");
            return Err(VadError::Engine(EngineFailure {
                context: "frame processing".into(),
                status: Status::RuntimeError,
                status_text: self.binding.status_to_string(Status::RuntimeError),
                messages: vec![format!("engine returned probability {probability}")],
            }));
        }

        Ok(probability.clamp(0.0, 1.0))
    }

    /// Release the instance. Returns the arena for bounded-memory instances.
    pub fn destroy(mut self) -> Option<MemoryArena> {
        self.release();
        self.arena.take()
    }

    /// Samples per frame required by `process`.
    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    /// Required input sample rate (Hz).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn profile(&self) -> Profile {
        self.binding.profile()
    }

    pub fn binding(&self) -> &Arc<dyn Binding> {
        &self.binding
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn from_parts(
        binding: Arc<dyn Binding>,
        handle: RawHandle,
        arena: Option<MemoryArena>,
    ) -> Self {
        Self {
            frame_length: binding.frame_length(),
            sample_rate: binding.sample_rate(),
            version: binding.version(),
            binding,
            handle: Some(handle),
            arena,
        }
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.binding.delete(handle);
            debug!("engine instance released");
        }
    }
}

impl Drop for VadEngine {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for VadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VadEngine")
            .field("profile", &self.binding.profile())
            .field("version", &self.version)
            .field("frame_length", &self.frame_length)
            .field("sample_rate", &self.sample_rate)
            .field("arena", &self.arena)
            .finish()
    }
}

/// List the inference devices a desktop build can run on.
///
/// # Errors
/// `VadError::Unsupported` on bounded-memory builds; otherwise the engine
/// status with its error stack.
pub fn list_hardware_devices(binding: &dyn Binding) -> Result<Vec<String>> {
    if binding.profile() != Profile::Desktop {
        return Err(VadError::Unsupported {
            operation: "hardware device listing",
            profile: binding.profile(),
        });
    }
    binding
        .hardware_devices()
        .map_err(|status| explain_failure(binding, status, "hardware device listing"))
}

/// Frame length and sample rate must be positive for any binding, or the
/// streaming loop could never make progress.
fn check_constants(binding: &dyn Binding) -> Result<()> {
    if binding.frame_length() == 0 {
        return Err(anyhow!("engine reported invalid frame length 0").into());
    }
    if binding.sample_rate() == 0 {
        return Err(anyhow!("engine reported invalid sample rate 0").into());
    }
    Ok(())
}

fn check_no_nul(what: &str, value: &str) -> Result<()> {
    if value.contains('\0') {
        return Err(VadError::InvalidArgument(format!(
            "{what} must not contain NUL bytes"
        )));
    }
    Ok(())
}
