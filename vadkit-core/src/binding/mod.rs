//! Engine binding abstraction.
//!
//! The `Binding` trait is the full entry-point contract of the VAD engine.
//! It decouples everything above it from how the engine was obtained:
//!
//! - [`dynamic::DynamicBinding`] resolves the entry points from a shared
//!   library at runtime (desktop builds, or bounded-memory builds shipped
//!   as a module).
//! - [`stub::StubBinding`] is an in-process engine used by tests and demos.
//!
//! Methods report raw [`Status`] codes. Turning a status into a
//! [`crate::VadError`] with its error stack is the engine layer's job, and it
//! must happen immediately after the failing call.

pub mod dynamic;
pub mod stub;

use std::ffi::c_void;
use std::fmt;

use crate::engine::arena::MemoryArena;
use crate::status::Status;

/// Deployment profile of an engine build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Profile {
    /// Heap-allocating build with credential activation and inference
    /// device selection.
    Desktop,
    /// Build that runs out of a caller-provided memory arena.
    BoundedMemory,
}

/// Opaque engine instance pointer.
///
/// Only [`crate::engine::VadEngine`] holds one for longer than a call; it may
/// move between threads but is never shared.
#[derive(PartialEq, Eq)]
pub struct RawHandle(*mut c_void);

// SAFETY: the engine has no thread affinity; exclusive access is enforced by
// `VadEngine` taking `&mut self` for every call that uses the handle.
#[allow(unsafe_code)]
unsafe impl Send for RawHandle {}

impl RawHandle {
    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle({:p})", self.0)
    }
}

/// What an engine instance is constructed from, besides the credential.
pub enum InitTarget<'a> {
    /// Desktop: inference device selector (`"best"`, `"cpu"`, `"gpu:0"`, ...).
    Device(&'a str),
    /// Bounded-memory: the arena the instance lives in.
    Arena(&'a mut MemoryArena),
}

/// Contract for VAD engine backends.
pub trait Binding: Send + Sync + 'static {
    fn profile(&self) -> Profile;

    /// Engine-rendered description of a status.
    fn status_to_string(&self, status: Status) -> String;

    /// Required input sample rate (Hz). Constant for an engine build.
    fn sample_rate(&self) -> u32;

    /// Required samples per frame. Constant for an engine build.
    fn frame_length(&self) -> usize;

    fn version(&self) -> String;

    /// Construct an engine instance. On error nothing was allocated.
    fn init(&self, credential: &str, target: InitTarget<'_>) -> Result<RawHandle, Status>;

    /// Release an instance. Must be called exactly once per handle returned
    /// by [`Binding::init`], after its last `process` call.
    fn delete(&self, handle: RawHandle);

    /// Process one frame of exactly [`Binding::frame_length`] samples and
    /// return the voice probability in `[0, 1]`.
    fn process(&self, handle: &RawHandle, pcm: &[i16]) -> Result<f32, Status>;

    /// Retrieve the error stack describing the most recent failure.
    fn error_stack(&self) -> Result<ErrorStack<'_>, Status>;

    /// Inference devices the engine can run on (desktop profile).
    fn hardware_devices(&self) -> Result<Vec<String>, Status> {
        Err(Status::InvalidState)
    }

    /// Minimum arena size for [`InitTarget::Arena`], probed using
    /// `preliminary` as scratch (bounded-memory profile).
    fn min_memory_buffer_size(&self, _preliminary: &mut MemoryArena) -> Result<usize, Status> {
        Err(Status::InvalidState)
    }
}

/// Ordered diagnostic messages for a failure, outer cause first.
///
/// The backing storage belongs to the binding that produced it and is
/// released exactly once: by [`ErrorStack::release`] or on drop.
pub struct ErrorStack<'b> {
    messages: Vec<String>,
    release: Option<Box<dyn FnOnce() + 'b>>,
}

impl<'b> ErrorStack<'b> {
    /// Wrap messages whose native storage is freed by `release`.
    pub fn new(messages: Vec<String>, release: impl FnOnce() + 'b) -> Self {
        Self {
            messages,
            release: Some(Box::new(release)),
        }
    }

    /// Messages with nothing to release.
    pub fn owned(messages: Vec<String>) -> Self {
        Self {
            messages,
            release: None,
        }
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Release the native stack now, keeping the messages.
    pub fn release(mut self) -> Vec<String> {
        self.free();
        std::mem::take(&mut self.messages)
    }

    fn free(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for ErrorStack<'_> {
    fn drop(&mut self) {
        self.free();
    }
}

impl fmt::Debug for ErrorStack<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorStack")
            .field("messages", &self.messages)
            .field("released", &self.release.is_none())
            .finish()
    }
}
