//! Bounded-memory initialization.
//!
//! Bounded-memory engine builds run entirely out of a caller-provided arena
//! whose required size is private to the engine binary. Sizing is therefore
//! two explicit steps:
//!
//! ```text
//! ArenaSizing::probe(binding, preliminary_size)   // scratch arena, asks the engine
//!     └─► ArenaSizing::allocate()                  // tightly sized arena
//!         └─► VadEngine::with_arena(binding, key, arena)
//! ```
//!
//! The minimum depends only on the engine build, never on audio content.

use std::ffi::c_void;

use tracing::info;

use super::report::explain_failure;
use crate::binding::{Binding, Profile};
use crate::error::{Result, VadError};

/// Size of the scratch arena handed to the probe when none is configured.
pub const DEFAULT_PRELIMINARY_SIZE: usize = 50 * 1024;

/// Alignment guaranteed for arena storage.
pub const ARENA_ALIGNMENT: usize = std::mem::align_of::<u64>();

/// Caller-owned, 8-byte aligned byte buffer an engine instance lives in.
///
/// A `VadEngine` built from an arena owns it until destroyed, so the
/// arena always outlives the engine handle placed in it.
pub struct MemoryArena {
    /// Backing words; `u64` storage provides the alignment.
    words: Vec<u64>,
    len: usize,
}

impl MemoryArena {
    /// Allocate a zeroed arena of `len` bytes.
    ///
    /// # Errors
    /// `VadError::OutOfMemory` if the host cannot satisfy the request.
    pub fn try_new(len: usize) -> Result<Self> {
        let word_count = len.div_ceil(ARENA_ALIGNMENT);
        let mut words = Vec::new();
        words
            .try_reserve_exact(word_count)
            .map_err(|_| VadError::OutOfMemory { requested: len })?;
        words.resize(word_count, 0);
        Ok(Self { words, len })
    }

    /// Usable size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        self.words.as_mut_ptr().cast()
    }
}

impl std::fmt::Debug for MemoryArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryArena").field("len", &self.len).finish()
    }
}

/// Result of probing the engine for its arena requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaSizing {
    /// Scratch size the probe ran with.
    pub preliminary_size: usize,
    /// Smallest arena the engine can be constructed in.
    pub min_size: usize,
}

impl ArenaSizing {
    /// Ask the engine how much memory an instance needs, using a scratch
    /// arena of `preliminary_size` bytes that is released before returning.
    ///
    /// # Errors
    /// - `VadError::Unsupported` for desktop engine builds.
    /// - `VadError::OutOfMemory` if the scratch arena cannot be allocated.
    /// - The engine's status (typically invalid-argument or invalid-state
    ///   when the scratch arena is too small), with its error stack.
    pub fn probe(binding: &dyn Binding, preliminary_size: usize) -> Result<Self> {
        if binding.profile() != Profile::BoundedMemory {
            return Err(VadError::Unsupported {
                operation: "memory size probe",
                profile: binding.profile(),
            });
        }

        let mut preliminary = MemoryArena::try_new(preliminary_size)?;
        let min_size = binding
            .min_memory_buffer_size(&mut preliminary)
            .map_err(|status| explain_failure(binding, status, "memory size probe"))?;

        info!(preliminary_size, min_size, "engine arena requirement probed");
        Ok(Self {
            preliminary_size,
            min_size,
        })
    }

    /// Allocate the tightly sized arena.
    pub fn allocate(&self) -> Result<MemoryArena> {
        MemoryArena::try_new(self.min_size)
    }
}
