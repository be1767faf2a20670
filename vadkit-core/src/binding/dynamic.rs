//! Runtime resolution of engine entry points from a shared library.
//!
//! ## Resolution
//!
//! ```text
//! DynamicBinding::load(path, profile)
//!     └─► Library::new(path)                 → LibraryLoad on failure
//!         └─► resolve COMMON_SYMBOLS          ┐
//!             └─► resolve profile symbols     ┘ MissingSymbol { symbol } on the first gap
//!                 └─► read sample rate / frame length / version once
//! ```
//!
//! Resolution is all-or-nothing: every symbol is copied out into a local
//! before the binding is assembled, so a caller never sees a partially
//! bound engine.
//!
//! The `Library` is owned by the binding, and every `VadEngine` keeps the
//! binding alive through an `Arc`. Engine handles are therefore always
//! deleted before the module is unloaded.

#![allow(unsafe_code)]

use std::ffi::{c_char, c_void, CStr, CString};
use std::path::{Path, PathBuf};
use std::ptr;

use anyhow::anyhow;
use libloading::Library;
use tracing::{debug, info, warn};

use super::{Binding, ErrorStack, InitTarget, Profile, RawHandle};
use crate::engine::arena::MemoryArena;
use crate::error::{Result, VadError};
use crate::status::Status;

type StatusToStringFn = unsafe extern "C" fn(status: i32) -> *const c_char;
type SampleRateFn = unsafe extern "C" fn() -> i32;
type FrameLengthFn = unsafe extern "C" fn() -> i32;
type VersionFn = unsafe extern "C" fn() -> *const c_char;
type DesktopInitFn = unsafe extern "C" fn(
    access_key: *const c_char,
    device: *const c_char,
    object: *mut *mut c_void,
) -> i32;
type BoundedInitFn = unsafe extern "C" fn(
    access_key: *const c_char,
    memory_size: i32,
    memory_buffer: *mut c_void,
    object: *mut *mut c_void,
) -> i32;
type DeleteFn = unsafe extern "C" fn(object: *mut c_void);
type ProcessFn =
    unsafe extern "C" fn(object: *mut c_void, pcm: *const i16, is_voiced: *mut f32) -> i32;
type GetErrorStackFn =
    unsafe extern "C" fn(message_stack: *mut *mut *mut c_char, depth: *mut i32) -> i32;
type FreeErrorStackFn = unsafe extern "C" fn(message_stack: *mut *mut c_char);
type ListHardwareDevicesFn =
    unsafe extern "C" fn(devices: *mut *mut *mut c_char, count: *mut i32) -> i32;
type FreeHardwareDevicesFn = unsafe extern "C" fn(devices: *mut *mut c_char, count: i32);
type MinMemoryBufferSizeFn = unsafe extern "C" fn(
    preliminary_buffer: *mut c_void,
    preliminary_size: i32,
    min_size: *mut i32,
) -> i32;

/// Entry points every engine build exports, in resolution order.
pub const COMMON_SYMBOLS: [&str; 9] = [
    "pv_status_to_string",
    "pv_sample_rate",
    "pv_cobra_init",
    "pv_cobra_delete",
    "pv_cobra_process",
    "pv_cobra_frame_length",
    "pv_cobra_version",
    "pv_get_error_stack",
    "pv_free_error_stack",
];

/// Desktop-only entry points.
pub const DESKTOP_SYMBOLS: [&str; 2] = [
    "pv_cobra_list_hardware_devices",
    "pv_cobra_free_hardware_devices",
];

/// Bounded-memory-only entry points.
pub const BOUNDED_MEMORY_SYMBOLS: [&str; 1] = ["pv_cobra_get_min_memory_buffer_size"];

/// Full list of symbols resolved for `profile`, in order.
pub fn required_symbols(profile: Profile) -> Vec<&'static str> {
    let extra: &[&'static str] = match profile {
        Profile::Desktop => &DESKTOP_SYMBOLS,
        Profile::BoundedMemory => &BOUNDED_MEMORY_SYMBOLS,
    };
    COMMON_SYMBOLS.iter().chain(extra).copied().collect()
}

enum ProfileSymbols {
    Desktop {
        init: DesktopInitFn,
        list_hardware_devices: ListHardwareDevicesFn,
        free_hardware_devices: FreeHardwareDevicesFn,
    },
    BoundedMemory {
        init: BoundedInitFn,
        get_min_memory_buffer_size: MinMemoryBufferSizeFn,
    },
}

/// Engine entry points resolved from a loaded module.
pub struct DynamicBinding {
    path: PathBuf,
    status_to_string: StatusToStringFn,
    delete: DeleteFn,
    process: ProcessFn,
    get_error_stack: GetErrorStackFn,
    free_error_stack: FreeErrorStackFn,
    profile_symbols: ProfileSymbols,
    sample_rate: u32,
    frame_length: usize,
    version: String,
    /// Kept last so it is dropped after everything resolved from it.
    _library: Library,
}

impl DynamicBinding {
    /// Load the engine module at `path` and resolve every entry point
    /// required by `profile`.
    ///
    /// # Errors
    /// - `VadError::LibraryLoad` if the module cannot be loaded.
    /// - `VadError::MissingSymbol` naming the first entry point not found.
    pub fn load(path: impl AsRef<Path>, profile: Profile) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // SAFETY: loading runs the module's initialisers. The engine module
        // is trusted vendor code whose initialisers have no preconditions.
        let library = unsafe { Library::new(&path) }.map_err(|source| VadError::LibraryLoad {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "engine module loaded");

        let status_to_string: StatusToStringFn = resolve(&library, COMMON_SYMBOLS[0])?;
        let sample_rate_fn: SampleRateFn = resolve(&library, COMMON_SYMBOLS[1])?;
        // pv_cobra_init has a profile-specific signature; resolved below.
        ensure_present(&library, COMMON_SYMBOLS[2])?;
        let delete: DeleteFn = resolve(&library, COMMON_SYMBOLS[3])?;
        let process: ProcessFn = resolve(&library, COMMON_SYMBOLS[4])?;
        let frame_length_fn: FrameLengthFn = resolve(&library, COMMON_SYMBOLS[5])?;
        let version_fn: VersionFn = resolve(&library, COMMON_SYMBOLS[6])?;
        let get_error_stack: GetErrorStackFn = resolve(&library, COMMON_SYMBOLS[7])?;
        let free_error_stack: FreeErrorStackFn = resolve(&library, COMMON_SYMBOLS[8])?;

        let profile_symbols = match profile {
            Profile::Desktop => ProfileSymbols::Desktop {
                init: resolve(&library, COMMON_SYMBOLS[2])?,
                list_hardware_devices: resolve(&library, DESKTOP_SYMBOLS[0])?,
                free_hardware_devices: resolve(&library, DESKTOP_SYMBOLS[1])?,
            },
            Profile::BoundedMemory => ProfileSymbols::BoundedMemory {
                init: resolve(&library, COMMON_SYMBOLS[2])?,
                get_min_memory_buffer_size: resolve(&library, BOUNDED_MEMORY_SYMBOLS[0])?,
            },
        };

        // SAFETY: the getters take no arguments and return build constants.
        let (raw_rate, raw_frame_length, version) = unsafe {
            (
                sample_rate_fn(),
                frame_length_fn(),
                c_string(version_fn()),
            )
        };

        let sample_rate = u32::try_from(raw_rate)
            .ok()
            .filter(|rate| *rate > 0)
            .ok_or_else(|| anyhow!("engine reported invalid sample rate {raw_rate}"))?;
        let frame_length = usize::try_from(raw_frame_length)
            .ok()
            .filter(|len| *len > 0)
            .ok_or_else(|| anyhow!("engine reported invalid frame length {raw_frame_length}"))?;

        info!(
            path = %path.display(),
            ?profile,
            version = version.as_str(),
            sample_rate,
            frame_length,
            "engine bindings resolved"
        );

        Ok(Self {
            path,
            status_to_string,
            delete,
            process,
            get_error_stack,
            free_error_stack,
            profile_symbols,
            sample_rate,
            frame_length,
            version,
            _library: library,
        })
    }

    /// Path the module was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Binding for DynamicBinding {
    fn profile(&self) -> Profile {
        match self.profile_symbols {
            ProfileSymbols::Desktop { .. } => Profile::Desktop,
            ProfileSymbols::BoundedMemory { .. } => Profile::BoundedMemory,
        }
    }

    fn status_to_string(&self, status: Status) -> String {
        // SAFETY: returns a pointer to a static string owned by the module.
        let text = unsafe { c_string((self.status_to_string)(status.code())) };
        if text.is_empty() {
            status.as_str().to_string()
        } else {
            text
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn init(&self, credential: &str, target: InitTarget<'_>) -> std::result::Result<RawHandle, Status> {
        let credential = CString::new(credential).map_err(|_| Status::InvalidArgument)?;
        let mut object: *mut c_void = ptr::null_mut();

        let code = match (&self.profile_symbols, target) {
            (ProfileSymbols::Desktop { init, .. }, InitTarget::Device(device)) => {
                let device = CString::new(device).map_err(|_| Status::InvalidArgument)?;
                // SAFETY: both strings are NUL-terminated and outlive the call;
                // `object` is a valid out-pointer.
                unsafe { (*init)(credential.as_ptr(), device.as_ptr(), &mut object) }
            }
            (ProfileSymbols::BoundedMemory { init, .. }, InitTarget::Arena(arena)) => {
                let size = i32::try_from(arena.len()).map_err(|_| Status::InvalidArgument)?;
                // SAFETY: the arena pointer is valid for `size` bytes and is
                // kept alive by the owning `VadEngine` until after delete.
                unsafe { (*init)(credential.as_ptr(), size, arena.as_mut_ptr(), &mut object) }
            }
            (_, _) => {
                warn!(profile = ?self.profile(), "init target does not match the engine profile");
                return Err(Status::InvalidArgument);
            }
        };

        match Status::from_code_lossy(code) {
            Status::Success if !object.is_null() => Ok(RawHandle::from_ptr(object)),
            Status::Success => Err(Status::RuntimeError),
            status => Err(status),
        }
    }

    fn delete(&self, handle: RawHandle) {
        // SAFETY: `handle` came from `init` on this module and is consumed here.
        unsafe { (self.delete)(handle.as_ptr()) }
    }

    fn process(&self, handle: &RawHandle, pcm: &[i16]) -> std::result::Result<f32, Status> {
        if pcm.len() != self.frame_length {
            return Err(Status::InvalidArgument);
        }
        let mut is_voiced = 0f32;
        // SAFETY: `pcm` holds exactly `frame_length` samples and is only read.
        let code = unsafe { (self.process)(handle.as_ptr(), pcm.as_ptr(), &mut is_voiced) };
        match Status::from_code_lossy(code) {
            Status::Success => Ok(is_voiced),
            status => Err(status),
        }
    }

    fn error_stack(&self) -> std::result::Result<ErrorStack<'_>, Status> {
        let mut stack: *mut *mut c_char = ptr::null_mut();
        let mut depth = 0i32;
        // SAFETY: both out-pointers are valid for writes.
        let code = unsafe { (self.get_error_stack)(&mut stack, &mut depth) };
        let status = Status::from_code_lossy(code);
        if !status.is_success() {
            return Err(status);
        }

        // SAFETY: on success the engine returns `depth` valid C strings.
        let messages = unsafe { copy_string_list(stack, depth) };
        if stack.is_null() {
            return Ok(ErrorStack::owned(messages));
        }

        let free = self.free_error_stack;
        // SAFETY: `stack` is freed exactly once, by the ErrorStack guard.
        Ok(ErrorStack::new(messages, move || unsafe { free(stack) }))
    }

    fn hardware_devices(&self) -> std::result::Result<Vec<String>, Status> {
        let ProfileSymbols::Desktop {
            list_hardware_devices,
            free_hardware_devices,
            ..
        } = self.profile_symbols
        else {
            return Err(Status::InvalidState);
        };

        let mut devices: *mut *mut c_char = ptr::null_mut();
        let mut count = 0i32;
        // SAFETY: both out-pointers are valid for writes.
        let code = unsafe { list_hardware_devices(&mut devices, &mut count) };
        let status = Status::from_code_lossy(code);
        if !status.is_success() {
            return Err(status);
        }

        // SAFETY: on success the engine returns `count` valid C strings,
        // copied before the list is handed back.
        let names = unsafe { copy_string_list(devices, count) };
        if !devices.is_null() {
            unsafe { free_hardware_devices(devices, count) };
        }
        Ok(names)
    }

    fn min_memory_buffer_size(&self, preliminary: &mut MemoryArena) -> std::result::Result<usize, Status> {
        let ProfileSymbols::BoundedMemory {
            get_min_memory_buffer_size,
            ..
        } = self.profile_symbols
        else {
            return Err(Status::InvalidState);
        };

        let size = i32::try_from(preliminary.len()).map_err(|_| Status::InvalidArgument)?;
        let mut min_size = 0i32;
        // SAFETY: the preliminary arena is valid for `size` bytes for the call.
        let code =
            unsafe { get_min_memory_buffer_size(preliminary.as_mut_ptr(), size, &mut min_size) };
        match Status::from_code_lossy(code) {
            Status::Success => usize::try_from(min_size).map_err(|_| Status::RuntimeError),
            status => Err(status),
        }
    }
}

impl std::fmt::Debug for DynamicBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicBinding")
            .field("path", &self.path)
            .field("profile", &self.profile())
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Copy a function pointer for `symbol` out of `library`.
fn resolve<T: Copy>(library: &Library, symbol: &'static str) -> Result<T> {
    // SAFETY: `T` is the documented signature of `symbol`; the pointer stays
    // valid for as long as `library`, which the binding owns.
    let resolved = unsafe { library.get::<T>(symbol.as_bytes()) }
        .map_err(|source| VadError::MissingSymbol { symbol, source })?;
    debug!(symbol, "resolved engine symbol");
    Ok(*resolved)
}

/// Check that `symbol` exists without committing to a signature yet.
fn ensure_present(library: &Library, symbol: &'static str) -> Result<()> {
    resolve::<*mut c_void>(library, symbol).map(|_| ())
}

/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn c_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

/// # Safety
/// `list` must be null or point to `count` valid C string pointers.
unsafe fn copy_string_list(list: *mut *mut c_char, count: i32) -> Vec<String> {
    let Ok(count) = usize::try_from(count) else {
        return Vec::new();
    };
    if list.is_null() || count == 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(list, count)
        .iter()
        .map(|entry| c_string(*entry))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desktop_profile_requires_device_listing() {
        let symbols = required_symbols(Profile::Desktop);
        assert_eq!(symbols.len(), 11);
        assert_eq!(symbols[0], "pv_status_to_string");
        assert!(symbols.contains(&"pv_cobra_list_hardware_devices"));
        assert!(!symbols.contains(&"pv_cobra_get_min_memory_buffer_size"));
    }

    #[test]
    fn bounded_profile_requires_memory_probe() {
        let symbols = required_symbols(Profile::BoundedMemory);
        assert_eq!(symbols.len(), 10);
        assert!(symbols.contains(&"pv_cobra_get_min_memory_buffer_size"));
        assert!(!symbols.contains(&"pv_cobra_free_hardware_devices"));
    }

    #[test]
    fn missing_module_reports_path() {
        let err = DynamicBinding::load("/nonexistent/libvad_engine.so", Profile::Desktop)
            .expect_err("module should not load");
        match err {
            VadError::LibraryLoad { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/libvad_engine.so"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn copy_string_list_tolerates_null_and_negative_depth() {
        unsafe {
            assert!(copy_string_list(ptr::null_mut(), 3).is_empty());
            assert!(copy_string_list(ptr::null_mut(), -1).is_empty());
        }
    }

    #[test]
    fn copy_string_list_reads_every_entry() {
        let owned: Vec<CString> = ["cpu", "gpu:0"]
            .iter()
            .map(|s| CString::new(*s).unwrap())
            .collect();
        let mut ptrs: Vec<*mut c_char> = owned.iter().map(|s| s.as_ptr() as *mut c_char).collect();
        let names = unsafe { copy_string_list(ptrs.as_mut_ptr(), ptrs.len() as i32) };
        assert_eq!(names, vec!["cpu".to_string(), "gpu:0".to_string()]);
    }
}
