//! Residual blocks generic over the channel gate they carry.
//!
//! `BasicBlock<G>` and `Bottleneck<G>` share the same residual arithmetic:
//! main path, optional gate, shortcut, add, ReLU. The gate type is the only
//! thing that varies between `BasicBlock<SrmLayer>`, `BasicBlock<SeLayer>`
//! and a plain `BasicBlock<NoGate>`.

use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::{BatchNorm, Conv2d, VarBuilder};

use super::conv::{batch_norm, conv1x1, conv3x3, Downsample};
use crate::gate::{ChannelGate, NoGate};

/// Path added to a block's main output.
#[derive(Debug)]
pub enum Shortcut {
    Identity,
    Projection(Downsample),
}

impl Shortcut {
    /// Whether a block mapping `in_planes` to `out_planes` at `stride`
    /// changes the tensor shape and so needs a projection.
    pub fn is_required(in_planes: usize, out_planes: usize, stride: usize) -> bool {
        stride != 1 || in_planes != out_planes
    }

    /// Builds the projection under `vb` when the shapes differ, the identity
    /// otherwise.
    pub fn for_block(
        in_planes: usize,
        out_planes: usize,
        stride: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        if Self::is_required(in_planes, out_planes, stride) {
            Ok(Shortcut::Projection(Downsample::new(
                in_planes, out_planes, stride, vb,
            )?))
        } else {
            Ok(Shortcut::Identity)
        }
    }
}

impl ModuleT for Shortcut {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        match self {
            Shortcut::Identity => Ok(xs.clone()),
            Shortcut::Projection(downsample) => downsample.forward_t(xs, train),
        }
    }
}

pub trait ResidualBlock: ModuleT + std::fmt::Debug + Sized {
    /// Ratio between the block's output width and `planes`.
    const EXPANSION: usize;

    fn new(
        in_planes: usize,
        planes: usize,
        stride: usize,
        shortcut: Shortcut,
        reduction: usize,
        vb: VarBuilder,
    ) -> Result<Self>;
}

fn check_shortcut(in_planes: usize, out_planes: usize, stride: usize, shortcut: &Shortcut) -> Result<()> {
    if matches!(shortcut, Shortcut::Identity) && Shortcut::is_required(in_planes, out_planes, stride) {
        candle_core::bail!(
            "block {in_planes} -> {out_planes} at stride {stride} needs a projection shortcut"
        );
    }
    Ok(())
}

#[derive(Debug)]
pub struct BasicBlock<G: ChannelGate = NoGate> {
    conv1: Conv2d,
    bn1: BatchNorm,
    conv2: Conv2d,
    bn2: BatchNorm,
    layer_block: G,
    shortcut: Shortcut,
}

impl<G: ChannelGate> ResidualBlock for BasicBlock<G> {
    const EXPANSION: usize = 1;

    fn new(
        in_planes: usize,
        planes: usize,
        stride: usize,
        shortcut: Shortcut,
        reduction: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        check_shortcut(in_planes, planes * Self::EXPANSION, stride, &shortcut)?;

        Ok(BasicBlock {
            conv1: conv3x3(in_planes, planes, stride, vb.pp("conv1"))?,
            bn1: batch_norm(planes, vb.pp("bn1"))?,
            conv2: conv3x3(planes, planes, 1, vb.pp("conv2"))?,
            bn2: batch_norm(planes, vb.pp("bn2"))?,
            layer_block: G::new(planes, reduction, vb.pp("layer_block"))?,
            shortcut,
        })
    }
}

impl<G: ChannelGate> ModuleT for BasicBlock<G> {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let out = self.conv1.forward(xs)?.apply_t(&self.bn1, train)?.relu()?;
        let out = self.conv2.forward(&out)?.apply_t(&self.bn2, train)?;
        let out = self.layer_block.forward_t(&out, train)?;

        let residual = self.shortcut.forward_t(xs, train)?;
        (out + residual)?.relu()
    }
}

#[derive(Debug)]
pub struct Bottleneck<G: ChannelGate = NoGate> {
    conv1: Conv2d,
    bn1: BatchNorm,
    conv2: Conv2d,
    bn2: BatchNorm,
    conv3: Conv2d,
    bn3: BatchNorm,
    layer_block: G,
    shortcut: Shortcut,
}

impl<G: ChannelGate> ResidualBlock for Bottleneck<G> {
    const EXPANSION: usize = 4;

    fn new(
        in_planes: usize,
        planes: usize,
        stride: usize,
        shortcut: Shortcut,
        reduction: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let out_planes = planes * Self::EXPANSION;
        check_shortcut(in_planes, out_planes, stride, &shortcut)?;

        Ok(Bottleneck {
            conv1: conv1x1(in_planes, planes, 1, vb.pp("conv1"))?,
            bn1: batch_norm(planes, vb.pp("bn1"))?,
            conv2: conv3x3(planes, planes, stride, vb.pp("conv2"))?,
            bn2: batch_norm(planes, vb.pp("bn2"))?,
            conv3: conv1x1(planes, out_planes, 1, vb.pp("conv3"))?,
            bn3: batch_norm(out_planes, vb.pp("bn3"))?,
            layer_block: G::new(out_planes, reduction, vb.pp("layer_block"))?,
            shortcut,
        })
    }
}

impl<G: ChannelGate> ModuleT for Bottleneck<G> {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let out = self.conv1.forward(xs)?.apply_t(&self.bn1, train)?.relu()?;
        let out = self.conv2.forward(&out)?.apply_t(&self.bn2, train)?.relu()?;
        let out = self.conv3.forward(&out)?.apply_t(&self.bn3, train)?;
        let out = self.layer_block.forward_t(&out, train)?;

        let residual = self.shortcut.forward_t(xs, train)?;
        (out + residual)?.relu()
    }
}
