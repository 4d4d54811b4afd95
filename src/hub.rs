//! Ready-to-run network constructors.
//!
//! Each constructor builds the 32-layer CIFAR network with a fixed gate and,
//! when `pretrained` is set, restores every parameter from a checkpoint.
//! A checkpoint that does not match aborts construction; no partially
//! loaded network is ever returned.

use std::path::{Path, PathBuf};
use std::time::Duration;

use candle_core::{DType, Device, ModuleT, Tensor};
use candle_nn::{VarBuilder, VarMap};
use indicatif::{ProgressBar, ProgressStyle};

use crate::checkpoint;
use crate::gate::{NoGate, SeLayer, SrmLayer};
use crate::model::block::{BasicBlock, ResidualBlock};
use crate::model::resnet::{CifarResNet, Config};
use crate::Result;

/// Blocks per stage of the 32-layer network: 6n + 2 = 32.
pub const RESNET32_BLOCKS: usize = 5;

pub const DEFAULT_CHECKPOINT: &str = "srm_resnet32.safetensors";

pub type SrmBasicBlock = BasicBlock<SrmLayer>;
pub type SeBasicBlock = BasicBlock<SeLayer>;

/// Which gate the 32-layer network carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Variant {
    Srm,
    Se,
    Plain,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub num_classes: usize,
    pub reduction: usize,
    pub checkpoint: PathBuf,
    pub dtype: DType,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            num_classes: 10,
            reduction: 16,
            checkpoint: PathBuf::from(DEFAULT_CHECKPOINT),
            dtype: DType::F32,
        }
    }
}

/// A model together with the variable map that owns its parameters.
pub struct Network<B: ResidualBlock> {
    varmap: VarMap,
    model: CifarResNet<B>,
    device: Device,
}

impl<B: ResidualBlock> Network<B> {
    /// Builds a freshly initialized network on `device`.
    pub fn new(config: &Config, dtype: DType, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, dtype, device);
        let model = CifarResNet::new(vb, config)?;

        Ok(Network {
            varmap,
            model,
            device: device.clone(),
        })
    }

    /// Inference-mode logits for a (N, 3, H, W) batch.
    pub fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.model.forward_t(xs, false)
    }

    pub fn load_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        checkpoint::load_strict(&self.varmap, path, &self.device)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        checkpoint::save(&self.varmap, path)
    }

    pub fn num_parameters(&self) -> usize {
        self.varmap.all_vars().iter().map(|v| v.elem_count()).sum()
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn model(&self) -> &CifarResNet<B> {
        &self.model
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl<B: ResidualBlock> ModuleT for Network<B> {
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        self.model.forward_t(xs, train)
    }
}

fn load_with_progress<B: ResidualBlock>(network: &Network<B>, path: &Path, progress: bool) -> Result<()> {
    if !progress {
        return network.load_checkpoint(path);
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner());
    pb.set_message(format!("Loading {}", path.display()));
    pb.enable_steady_tick(Duration::from_millis(100));
    let loaded = network.load_checkpoint(path);
    pb.finish_and_clear();
    loaded
}

fn resnet32<B: ResidualBlock>(
    pretrained: bool,
    progress: bool,
    options: &Options,
    device: &Device,
) -> Result<Network<B>> {
    let config = Config {
        num_blocks: RESNET32_BLOCKS,
        num_classes: options.num_classes,
        reduction: options.reduction,
    };
    let network = Network::new(&config, options.dtype, device)?;

    if pretrained {
        load_with_progress(&network, &options.checkpoint, progress)?;
    }

    Ok(network)
}

/// 32-layer CIFAR ResNet with a style-based recalibration gate in every
/// block.
pub fn cifar_srm_resnet32(
    pretrained: bool,
    progress: bool,
    options: &Options,
    device: &Device,
) -> Result<Network<SrmBasicBlock>> {
    resnet32(pretrained, progress, options, device)
}

/// 32-layer CIFAR ResNet with a squeeze-and-excitation gate in every block.
pub fn cifar_se_resnet32(
    pretrained: bool,
    progress: bool,
    options: &Options,
    device: &Device,
) -> Result<Network<SeBasicBlock>> {
    resnet32(pretrained, progress, options, device)
}

/// Plain 32-layer CIFAR ResNet.
pub fn cifar_resnet32(
    pretrained: bool,
    progress: bool,
    options: &Options,
    device: &Device,
) -> Result<Network<BasicBlock<NoGate>>> {
    resnet32(pretrained, progress, options, device)
}
