pub mod checkpoint;
pub mod error;
pub mod gate;
pub mod hub;
pub mod metrics;
pub mod model;
pub mod preprocess;

pub use error::{Result, SrmResNetError};
pub use gate::{ChannelGate, NoGate, SeLayer, SrmLayer};
pub use hub::{cifar_resnet32, cifar_se_resnet32, cifar_srm_resnet32, Network, Options};
pub use model::block::{BasicBlock, Bottleneck, ResidualBlock, Shortcut};
pub use model::resnet::{CifarResNet, Config};

/// Maps a device flag to a device: `cpu`, `cuda` (first GPU) or a GPU
/// index. Anything else, including no flag, picks the first GPU when one is
/// available and the CPU otherwise.
pub fn parse_device(device: Option<String>) -> candle_core::Result<candle_core::Device> {
    match device.as_deref().map(str::trim) {
        Some("cpu") => Ok(candle_core::Device::Cpu),
        Some(flag) => match flag.parse::<usize>() {
            Ok(ordinal) => candle_core::Device::cuda_if_available(ordinal),
            Err(_) => candle_core::Device::cuda_if_available(0),
        },
        None => candle_core::Device::cuda_if_available(0),
    }
}

/// Seeds the device RNG used for parameter initialization.
///
/// The CPU backend cannot be seeded, so initialization there is not
/// reproducible across runs.
pub fn set_seed(seed: Option<u64>, device: &candle_core::Device) -> candle_core::Result<()> {
    match device {
        candle_core::Device::Cpu => {
            if seed.is_some() {
                log::warn!("Seed ignored on CPU");
            }
            log::info!("Device: CPU");
        }
        candle_core::Device::Cuda(_) => {
            log::info!("Seed: {}", seed.unwrap_or(1234));
            device.set_seed(seed.unwrap_or(1234))?;
            log::info!("Device: CUDA");
        }
        _ => {
            log::info!("Seed: {}", seed.unwrap_or(1234));
            device.set_seed(seed.unwrap_or(1234))?;
        }
    };

    Ok(())
}

/// Global average pool of a (N, C, H, W) map down to (N, C, 1, 1).
pub fn adaptive_avg_pool_2d(xs: &candle_core::Tensor) -> candle_core::Result<candle_core::Tensor> {
    let (b, c, _, _) = xs.dims4()?;
    xs.flatten_from(2)?
        .mean_keepdim(candle_core::D::Minus1)?
        .reshape((b, c, 1, 1))
}
