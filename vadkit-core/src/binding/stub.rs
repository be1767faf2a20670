//! `StubBinding`: in-process engine with the same contract as a real build.
//!
//! Scores frames with [`EnergyScorer`] so the whole streaming path can be
//! exercised without a native engine binary. Failure modes are configurable
//! and every lifecycle event is counted, so tests can assert on construction,
//! deletion and error-stack release balance.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{Binding, ErrorStack, InitTarget, Profile, RawHandle};
use crate::engine::arena::MemoryArena;
use crate::status::Status;
use crate::vad::EnergyScorer;

/// How the stub answers error stack retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubErrorStack {
    /// Return the messages recorded by the last failing call.
    Recorded,
    /// Always return an empty stack.
    Empty,
    /// Fail retrieval itself with this status.
    Fail(Status),
}

#[derive(Debug, Clone)]
pub struct StubConfig {
    pub profile: Profile,
    pub sample_rate: u32,
    pub frame_length: usize,
    pub version: String,
    /// When set, any other well-formed credential is refused at activation.
    pub expected_credential: Option<String>,
    /// Reported by `hardware_devices`; `"best"` is always accepted too.
    pub hardware_devices: Vec<String>,
    /// Arena size reported by the memory probe.
    pub min_memory_size: usize,
    /// Scratch arenas smaller than this make the probe fail.
    pub probe_scratch_size: usize,
    /// Process calls after this many successful ones fail.
    pub fail_process_after: Option<u64>,
    pub error_stack: StubErrorStack,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            profile: Profile::Desktop,
            sample_rate: 16_000,
            frame_length: 512,
            version: "2.0.0-stub".to_string(),
            expected_credential: None,
            hardware_devices: vec!["cpu".to_string()],
            min_memory_size: 24 * 1024,
            probe_scratch_size: 1024,
            fail_process_after: None,
            error_stack: StubErrorStack::Recorded,
        }
    }
}

/// Lifecycle counters shared with the test that owns the stub.
#[derive(Debug, Default)]
pub struct StubCounters {
    constructed: AtomicU64,
    destroyed: AtomicU64,
    process_calls: AtomicU64,
    stacks_retrieved: AtomicU64,
    stacks_released: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub constructed: u64,
    pub destroyed: u64,
    pub process_calls: u64,
    pub stacks_retrieved: u64,
    pub stacks_released: u64,
}

impl CounterSnapshot {
    pub fn live_instances(&self) -> u64 {
        self.constructed - self.destroyed
    }
}

impl StubCounters {
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            constructed: self.constructed.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            process_calls: self.process_calls.load(Ordering::Relaxed),
            stacks_retrieved: self.stacks_retrieved.load(Ordering::Relaxed),
            stacks_released: self.stacks_released.load(Ordering::Relaxed),
        }
    }
}

pub struct StubBinding {
    config: StubConfig,
    counters: Arc<StubCounters>,
    instances: Mutex<HashMap<usize, EnergyScorer>>,
    next_id: AtomicUsize,
    last_error: Mutex<Vec<String>>,
}

impl StubBinding {
    pub fn new(config: StubConfig) -> Self {
        Self {
            config,
            counters: Arc::new(StubCounters::default()),
            instances: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            last_error: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &StubConfig {
        &self.config
    }

    pub fn counters(&self) -> Arc<StubCounters> {
        Arc::clone(&self.counters)
    }

    /// Replace the recorded error stack, as a failing call would.
    pub fn set_last_error(&self, messages: Vec<String>) {
        *self.last_error.lock() = messages;
    }

    fn fail(&self, status: Status, messages: &[&str]) -> Status {
        self.set_last_error(messages.iter().map(|m| m.to_string()).collect());
        status
    }

    fn check_credential(&self, credential: &str) -> Result<(), Status> {
        if credential.is_empty() {
            return Err(self.fail(
                Status::InvalidArgument,
                &[
                    "failed to initialize the engine",
                    "credential is empty",
                ],
            ));
        }
        if credential.chars().any(char::is_whitespace) {
            return Err(self.fail(
                Status::InvalidArgument,
                &[
                    "failed to initialize the engine",
                    "credential is malformed",
                    "credential must not contain whitespace",
                ],
            ));
        }
        if let Some(expected) = &self.config.expected_credential {
            if expected != credential {
                return Err(self.fail(
                    Status::ActivationRefused,
                    &[
                        "failed to initialize the engine",
                        "activation refused for the supplied credential",
                    ],
                ));
            }
        }
        Ok(())
    }

    fn check_target(&self, target: &InitTarget<'_>) -> Result<(), Status> {
        match (self.config.profile, target) {
            (Profile::Desktop, InitTarget::Device(device)) => {
                let family = device.split(':').next().unwrap_or_default();
                let known = *device == "best"
                    || self.config.hardware_devices.iter().any(|d| d == family || d == device);
                if known {
                    Ok(())
                } else {
                    Err(self.fail(
                        Status::InvalidArgument,
                        &["failed to initialize the engine", "unknown inference device"],
                    ))
                }
            }
            (Profile::BoundedMemory, InitTarget::Arena(arena)) => {
                if arena.len() < self.config.min_memory_size {
                    Err(self.fail(
                        Status::OutOfMemory,
                        &[
                            "failed to initialize the engine",
                            "memory arena is smaller than the engine requires",
                        ],
                    ))
                } else {
                    Ok(())
                }
            }
            _ => Err(self.fail(
                Status::InvalidArgument,
                &["construction target does not match the engine build"],
            )),
        }
    }

    fn handle_id(handle: &RawHandle) -> usize {
        handle.as_ptr() as usize
    }
}

impl Default for StubBinding {
    fn default() -> Self {
        Self::new(StubConfig::default())
    }
}

impl Binding for StubBinding {
    fn profile(&self) -> Profile {
        self.config.profile
    }

    fn status_to_string(&self, status: Status) -> String {
        status.as_str().to_string()
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn frame_length(&self) -> usize {
        self.config.frame_length
    }

    fn version(&self) -> String {
        self.config.version.clone()
    }

    fn init(&self, credential: &str, target: InitTarget<'_>) -> Result<RawHandle, Status> {
        self.check_credential(credential)?;
        self.check_target(&target)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.instances.lock().insert(id, EnergyScorer::default());
        self.counters.constructed.fetch_add(1, Ordering::Relaxed);
        debug!(id, "StubBinding::init");
        Ok(RawHandle::from_ptr(id as *mut c_void))
    }

    fn delete(&self, handle: RawHandle) {
        let id = Self::handle_id(&handle);
        if self.instances.lock().remove(&id).is_some() {
            self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
            debug!(id, "StubBinding::delete");
        } else {
            warn!(id, "StubBinding::delete on unknown handle");
        }
    }

    fn process(&self, handle: &RawHandle, pcm: &[i16]) -> Result<f32, Status> {
        if pcm.len() != self.config.frame_length {
            return Err(self.fail(
                Status::InvalidArgument,
                &["failed to process frame", "frame has the wrong number of samples"],
            ));
        }

        let calls = self.counters.process_calls.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(limit) = self.config.fail_process_after {
            if calls > limit {
                return Err(self.fail(
                    Status::RuntimeError,
                    &["failed to process frame", "injected processing failure"],
                ));
            }
        }

        let mut instances = self.instances.lock();
        match instances.get_mut(&Self::handle_id(handle)) {
            Some(scorer) => Ok(scorer.score(pcm)),
            None => {
                drop(instances);
                Err(self.fail(
                    Status::InvalidArgument,
                    &["failed to process frame", "engine handle is not live"],
                ))
            }
        }
    }

    fn error_stack(&self) -> Result<ErrorStack<'_>, Status> {
        match &self.config.error_stack {
            StubErrorStack::Fail(status) => Err(*status),
            StubErrorStack::Empty => {
                self.counters.stacks_retrieved.fetch_add(1, Ordering::Relaxed);
                Ok(ErrorStack::new(Vec::new(), || {
                    self.counters.stacks_released.fetch_add(1, Ordering::Relaxed);
                }))
            }
            StubErrorStack::Recorded => {
                let messages = std::mem::take(&mut *self.last_error.lock());
                self.counters.stacks_retrieved.fetch_add(1, Ordering::Relaxed);
                Ok(ErrorStack::new(messages, || {
                    self.counters.stacks_released.fetch_add(1, Ordering::Relaxed);
                }))
            }
        }
    }

    fn hardware_devices(&self) -> Result<Vec<String>, Status> {
        match self.config.profile {
            Profile::Desktop => Ok(self.config.hardware_devices.clone()),
            Profile::BoundedMemory => Err(self.fail(
                Status::InvalidState,
                &["hardware device listing is not available in this build"],
            )),
        }
    }

    fn min_memory_buffer_size(&self, preliminary: &mut MemoryArena) -> Result<usize, Status> {
        match self.config.profile {
            Profile::BoundedMemory if preliminary.len() < self.config.probe_scratch_size => {
                Err(self.fail(
                    Status::InvalidArgument,
                    &[
                        "failed to compute the memory requirement",
                        "preliminary memory arena is too small",
                    ],
                ))
            }
            Profile::BoundedMemory => Ok(self.config.min_memory_size),
            Profile::Desktop => Err(self.fail(
                Status::InvalidState,
                &["memory probing is not available in this build"],
            )),
        }
    }
}
