//! Compute locality selection
//!
//! The device is chosen once at startup from a [`DeviceConfig`] and then
//! handed to every component that allocates tensors.

use crate::error::{EvalError, Result};
use candle_core::Device;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DeviceConfig {
    /// CUDA if available, CPU otherwise
    #[default]
    Auto,
    Cpu,
    Cuda(usize),
    Metal,
}

impl DeviceConfig {
    /// Resolve the configured locality into a candle device.
    ///
    /// An explicitly requested accelerator that cannot be opened falls back
    /// to the CPU.
    pub fn resolve(&self) -> Device {
        match self {
            DeviceConfig::Auto => {
                if candle_core::utils::cuda_is_available() {
                    if let Ok(device) = Device::new_cuda(0) {
                        tracing::info!("🎮 Using CUDA device");
                        return device;
                    }
                }
                tracing::info!("💻 Using CPU device");
                Device::Cpu
            }
            DeviceConfig::Cpu => Device::Cpu,
            DeviceConfig::Cuda(idx) => Device::new_cuda(*idx).unwrap_or_else(|e| {
                tracing::warn!("⚠️ CUDA device {} unavailable ({}), falling back to CPU", idx, e);
                Device::Cpu
            }),
            DeviceConfig::Metal => Device::new_metal(0).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Metal device unavailable ({}), falling back to CPU", e);
                Device::Cpu
            }),
        }
    }
}

impl FromStr for DeviceConfig {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(DeviceConfig::Auto),
            "cpu" => Ok(DeviceConfig::Cpu),
            "cuda" | "gpu" => Ok(DeviceConfig::Cuda(0)),
            "metal" => Ok(DeviceConfig::Metal),
            other => match other.strip_prefix("cuda:") {
                Some(idx) => idx
                    .parse()
                    .map(DeviceConfig::Cuda)
                    .map_err(|_| EvalError::InvalidDevice(s.to_string())),
                None => Err(EvalError::InvalidDevice(s.to_string())),
            },
        }
    }
}

impl fmt::Display for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceConfig::Auto => write!(f, "auto"),
            DeviceConfig::Cpu => write!(f, "cpu"),
            DeviceConfig::Cuda(idx) => write!(f, "cuda:{}", idx),
            DeviceConfig::Metal => write!(f, "metal"),
        }
    }
}

/// Human readable name of a resolved device
pub fn device_info(device: &Device) -> String {
    match device {
        Device::Cpu => "CPU".to_string(),
        Device::Cuda(_) => "CUDA GPU".to_string(),
        Device::Metal(_) => "Metal GPU".to_string(),
    }
}
