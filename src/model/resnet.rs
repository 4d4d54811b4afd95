use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::{BatchNorm, Conv2d, VarBuilder};

use super::block::{ResidualBlock, Shortcut};
use super::conv::{batch_norm, conv3x3};
use crate::adaptive_avg_pool_2d;

/// Channel width after the stem convolution.
const STEM_PLANES: usize = 16;
/// Input image channels (RGB).
const IN_CHANNELS: usize = 3;

/// `planes` and stride of the three stages. Only the first block of a stage
/// uses the stage stride.
pub const STAGES: [(usize, usize); 3] = [(16, 1), (32, 2), (64, 2)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Blocks per stage, shared by all three stages.
    pub num_blocks: usize,
    pub num_classes: usize,
    /// Forwarded to every gate.
    pub reduction: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            num_blocks: 5,
            num_classes: 10,
            reduction: 16,
        }
    }
}

/// A sequence of blocks sharing one output width.
#[derive(Debug)]
pub struct Stage<B: ResidualBlock> {
    blocks: Vec<B>,
}

impl<B: ResidualBlock> Stage<B> {
    /// Builds `blocks` blocks under `vb.pp("0")`, `vb.pp("1")`, ... and advances
    /// `in_planes` to the stage's output width.
    fn new(
        in_planes: &mut usize,
        planes: usize,
        blocks: usize,
        stride: usize,
        reduction: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let out_planes = planes * B::EXPANSION;
        let mut layers = Vec::with_capacity(blocks);

        let first = vb.pp("0");
        let shortcut = Shortcut::for_block(*in_planes, out_planes, stride, first.pp("downsample"))?;
        layers.push(B::new(*in_planes, planes, stride, shortcut, reduction, first)?);
        *in_planes = out_planes;

        for i in 1..blocks {
            layers.push(B::new(
                *in_planes,
                planes,
                1,
                Shortcut::Identity,
                reduction,
                vb.pp(i.to_string()),
            )?);
        }

        Ok(Stage { blocks: layers })
    }

    fn len(&self) -> usize {
        self.blocks.len()
    }
}

impl<B: ResidualBlock> ModuleT for Stage<B> {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let mut xs = xs.clone();
        for block in self.blocks.iter() {
            xs = block.forward_t(&xs, train)?;
        }
        Ok(xs)
    }
}

/// CIFAR-style residual network: 3x3 stem, three stages of width 16, 32
/// and 64 (times the block expansion), global average pool, linear
/// classifier. Returns logits.
#[derive(Debug)]
pub struct CifarResNet<B: ResidualBlock> {
    conv1: Conv2d,
    bn1: BatchNorm,
    layer1: Stage<B>,
    layer2: Stage<B>,
    layer3: Stage<B>,
    fc: candle_nn::Linear,
}

impl<B: ResidualBlock> CifarResNet<B> {
    pub fn new(vs: VarBuilder, c: &Config) -> Result<Self> {
        if c.num_blocks == 0 {
            candle_core::bail!("a stage needs at least one block");
        }
        if c.num_classes == 0 {
            candle_core::bail!("the classifier needs at least one class");
        }

        let conv1 = conv3x3(IN_CHANNELS, STEM_PLANES, 1, vs.pp("conv1"))?;
        let bn1 = batch_norm(STEM_PLANES, vs.pp("bn1"))?;

        let mut in_planes = STEM_PLANES;
        let [(p1, s1), (p2, s2), (p3, s3)] = STAGES;
        let layer1 = Stage::new(&mut in_planes, p1, c.num_blocks, s1, c.reduction, vs.pp("layer1"))?;
        let layer2 = Stage::new(&mut in_planes, p2, c.num_blocks, s2, c.reduction, vs.pp("layer2"))?;
        let layer3 = Stage::new(&mut in_planes, p3, c.num_blocks, s3, c.reduction, vs.pp("layer3"))?;

        let fc = candle_nn::linear(in_planes, c.num_classes, vs.pp("fc"))?;

        log::debug!(
            "CifarResNet: {} blocks per stage, {} classes, classifier width {}",
            c.num_blocks,
            c.num_classes,
            in_planes
        );

        Ok(CifarResNet {
            conv1,
            bn1,
            layer1,
            layer2,
            layer3,
            fc,
        })
    }

    /// Number of residual blocks across all stages.
    pub fn depth(&self) -> usize {
        self.layer1.len() + self.layer2.len() + self.layer3.len()
    }
}

impl<B: ResidualBlock> ModuleT for CifarResNet<B> {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let xs = self.conv1.forward(xs)?.apply_t(&self.bn1, train)?.relu()?;

        let xs = xs
            .apply_t(&self.layer1, train)?
            .apply_t(&self.layer2, train)?
            .apply_t(&self.layer3, train)?;

        let xs = adaptive_avg_pool_2d(&xs)?.flatten_from(1)?;
        self.fc.forward(&xs)
    }
}
