//! Audio input device enumeration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// An audio input device as seen by the capture backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// Position in the host's enumeration order; what `--audio_device_index` selects.
    pub index: usize,
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default input device.
    pub is_default: bool,
}

/// List all audio input devices on the default host.
///
/// A host without capture devices yields an empty list, not an error.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Result<Vec<DeviceDescriptor>> {
    use cpal::traits::{DeviceTrait, HostTrait};

    use crate::error::VadError;

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| VadError::AudioDevice(e.to_string()))?;

    let list = devices
        .enumerate()
        .map(|(index, device)| {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Input Device {}", index + 1));
            let is_default = default_name.as_deref() == Some(name.as_str());
            DeviceDescriptor {
                index,
                name,
                is_default,
            }
        })
        .collect::<Vec<_>>();

    tracing::debug!(count = list.len(), "enumerated input devices");
    Ok(list)
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Result<Vec<DeviceDescriptor>> {
    Ok(vec![])
}
