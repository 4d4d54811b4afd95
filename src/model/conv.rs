use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::{init, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, VarBuilder};

/// Bias-free convolution whose weight is drawn with Kaiming-normal fan-in
/// init scaled for ReLU.
fn conv2d(
    in_planes: usize,
    out_planes: usize,
    kernel_size: usize,
    padding: usize,
    stride: usize,
    vb: VarBuilder,
) -> Result<Conv2d> {
    let weight = vb.get_with_hints(
        (out_planes, in_planes, kernel_size, kernel_size),
        "weight",
        init::DEFAULT_KAIMING_NORMAL,
    )?;
    let cfg = Conv2dConfig {
        padding,
        stride,
        ..Default::default()
    };

    Ok(Conv2d::new(weight, None, cfg))
}

/// 3x3 convolution, padding 1. Keeps the spatial size at stride 1.
pub fn conv3x3(in_planes: usize, out_planes: usize, stride: usize, vb: VarBuilder) -> Result<Conv2d> {
    conv2d(in_planes, out_planes, 3, 1, stride, vb)
}

pub fn conv1x1(in_planes: usize, out_planes: usize, stride: usize, vb: VarBuilder) -> Result<Conv2d> {
    conv2d(in_planes, out_planes, 1, 0, stride, vb)
}

/// Batch norm with scale 1, offset 0 and unit running statistics.
pub fn batch_norm(num_features: usize, vb: VarBuilder) -> Result<BatchNorm> {
    candle_nn::batch_norm(num_features, BatchNormConfig::default(), vb)
}

/// Shortcut projection: 1x1 convolution at the block's stride followed by
/// batch norm. Stored as `downsample.0` / `downsample.1`.
#[derive(Debug)]
pub struct Downsample {
    conv: Conv2d,
    bn: BatchNorm,
}

impl Downsample {
    pub fn new(in_planes: usize, out_planes: usize, stride: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Downsample {
            conv: conv1x1(in_planes, out_planes, stride, vb.pp("0"))?,
            bn: batch_norm(out_planes, vb.pp("1"))?,
        })
    }
}

impl ModuleT for Downsample {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        self.conv.forward(xs)?.apply_t(&self.bn, train)
    }
}
