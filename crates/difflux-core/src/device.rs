//! Execution devices exposed by an engine.

use std::fmt;

/// Coarse device category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceType {
    /// Host processor.
    Cpu,
    /// Discrete or integrated accelerator.
    Gpu,
    /// Anything else an engine may expose.
    Other,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Cpu => write!(f, "CPU"),
            DeviceType::Gpu => write!(f, "GPU"),
            DeviceType::Other => write!(f, "OTHER"),
        }
    }
}

/// One execution unit exposed by an engine.
///
/// Created once at backend initialization and never mutated.
#[derive(Debug, Clone)]
pub struct ComputeDevice {
    /// Name of the owning backend.
    pub backend: String,
    /// Human-readable device kind, e.g. a processor model line.
    pub kind: String,
    /// Coarse device category.
    pub device_type: DeviceType,
    /// Free-form description (core counts, memory, driver ids).
    pub description: String,
    /// Opaque engine-native handle.
    pub handle: usize,
}

impl ComputeDevice {
    /// Creates a device record.
    pub fn new(
        backend: impl Into<String>,
        kind: impl Into<String>,
        device_type: DeviceType,
        description: impl Into<String>,
        handle: usize,
    ) -> Self {
        Self {
            backend: backend.into(),
            kind: kind.into(),
            device_type,
            description: description.into(),
            handle,
        }
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' ({}, {})", self.device_type, self.kind, self.backend, self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_display() {
        let dev = ComputeDevice::new("cpu", "host processor", DeviceType::Cpu, "8 logical cores", 0);
        let text = dev.to_string();
        assert!(text.contains("CPU"));
        assert!(text.contains("8 logical cores"));
    }
}
