use candle_core::{Module, Result, Tensor};
use candle_nn::VarBuilder;

use super::ChannelGate;
use crate::adaptive_avg_pool_2d;

/// Squeeze-and-excitation gate: global average pool, a `reduction`-wide
/// bottleneck MLP, then a sigmoid rescale per channel.
#[derive(Debug)]
pub struct SeLayer {
    fc1: candle_nn::Linear,
    fc2: candle_nn::Linear,
}

impl Module for SeLayer {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (b, c, _, _) = xs.dims4()?;
        let ys = adaptive_avg_pool_2d(xs)?.flatten_from(1)?;
        let ys = self.fc1.forward(&ys)?.relu()?;
        let ys = candle_nn::ops::sigmoid(&self.fc2.forward(&ys)?)?;

        xs.broadcast_mul(&ys.reshape((b, c, 1, 1))?)
    }
}

impl ChannelGate for SeLayer {
    fn new(channels: usize, reduction: usize, vb: VarBuilder) -> Result<Self> {
        if reduction == 0 || reduction > channels {
            candle_core::bail!("SE reduction {reduction} invalid for {channels} channels");
        }
        let squeeze_channels = channels / reduction;

        Ok(SeLayer {
            fc1: candle_nn::linear_no_bias(channels, squeeze_channels, vb.pp("fc.0"))?,
            fc2: candle_nn::linear_no_bias(squeeze_channels, channels, vb.pp("fc.2"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn rescales_without_changing_shape() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let se = SeLayer::new(32, 16, vb)?;

        let xs = Tensor::randn(0f32, 1., (2, 32, 4, 4), &Device::Cpu)?.abs()?;
        let ys = se.forward(&xs)?;
        assert_eq!(ys.dims(), xs.dims());

        // A gate in (0, 1) can only shrink non-negative activations.
        let grown = ys.gt(&xs)?.to_dtype(DType::U32)?.sum_all()?.to_scalar::<u32>()?;
        assert_eq!(grown, 0);

        let data = varmap.data().lock().unwrap();
        assert_eq!(data["fc.0.weight"].dims(), &[2, 32]);
        assert_eq!(data["fc.2.weight"].dims(), &[32, 2]);
        Ok(())
    }

    #[test]
    fn rejects_reduction_wider_than_channels() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        assert!(SeLayer::new(8, 16, vb.clone()).is_err());
        assert!(SeLayer::new(8, 0, vb).is_err());
    }
}
