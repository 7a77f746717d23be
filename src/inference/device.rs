use anyhow::{Context, Result};
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::Device;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Compute device requested in the configuration, resolved once at startup.
#[derive(ValueEnum, Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// CUDA if available, then Metal, then CPU
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

impl DeviceKind {
    pub fn resolve(self, ordinal: usize) -> Result<Device> {
        info!(
            "Supported features: avx: {}, neon: {}, simd128: {}, f16c: {}",
            candle_core::utils::with_avx(),
            candle_core::utils::with_neon(),
            candle_core::utils::with_simd128(),
            candle_core::utils::with_f16c()
        );

        let device = match self {
            DeviceKind::Auto if cuda_is_available() => Device::new_cuda(ordinal)?,
            DeviceKind::Auto if metal_is_available() => Device::new_metal(ordinal)?,
            DeviceKind::Auto | DeviceKind::Cpu => Device::Cpu,
            DeviceKind::Cuda => Device::new_cuda(ordinal)
                .with_context(|| format!("Failed to open CUDA device {ordinal}"))?,
            DeviceKind::Metal => Device::new_metal(ordinal)
                .with_context(|| format!("Failed to open Metal device {ordinal}"))?,
        };
        info!("Using device {:?}", device);
        Ok(device)
    }
}
