//! Style-based recalibration gate.
//!
//! Each channel is summarized by the mean and standard deviation of its
//! spatial activations (style pooling). A per-channel 2 -> 1 weight pair
//! folds the two statistics into one value, which is batch normalized and
//! squashed with a sigmoid into a gate in (0, 1) (style integration). The
//! input is then rescaled channel-wise by that gate.

use candle_core::{ModuleT, Result, Tensor, D};
use candle_nn::{init::Init, ops, BatchNorm, BatchNormConfig, Conv1d, Conv1dConfig, VarBuilder};

use super::ChannelGate;

/// Width of the per-channel statistic vector: (mean, std).
const STYLE_DIM: usize = 2;

#[derive(Debug)]
pub struct SrmLayer {
    cfc: Conv1d,
    bn: BatchNorm,
}

impl SrmLayer {
    /// Computes the (N, C, 1, 1) gate for `xs` without applying it.
    pub fn gate(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let (b, c, _, _) = xs.dims4()?;

        // (b, c, 2) -> (b, c, 1)
        let z = style_pool(xs)?.apply(&self.cfc)?;
        let z = z.apply_t(&self.bn, train)?;

        ops::sigmoid(&z)?.reshape((b, c, 1, 1))
    }
}

/// Per-channel (mean, std) over the flattened spatial extent.
///
/// The deviation is the unbiased estimator, so a 1x1 feature map gives NaN.
pub fn style_pool(xs: &Tensor) -> Result<Tensor> {
    let xs = xs.flatten_from(2)?;
    let mean = xs.mean_keepdim(D::Minus1)?;
    let std = xs.var_keepdim(D::Minus1)?.sqrt()?;

    Tensor::cat(&[&mean, &std], D::Minus1)
}

impl ModuleT for SrmLayer {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        xs.broadcast_mul(&self.gate(xs, train)?)
    }
}

impl ChannelGate for SrmLayer {
    fn new(channels: usize, _reduction: usize, vb: VarBuilder) -> Result<Self> {
        // Default uniform init of a grouped conv: fan_in is 1 * kernel width.
        let bound = 1. / (STYLE_DIM as f64).sqrt();
        let weight = vb.pp("cfc").get_with_hints(
            (channels, 1, STYLE_DIM),
            "weight",
            Init::Uniform {
                lo: -bound,
                up: bound,
            },
        )?;
        let cfg = Conv1dConfig {
            groups: channels,
            ..Default::default()
        };

        Ok(SrmLayer {
            cfc: Conv1d::new(weight, None, cfg),
            bn: candle_nn::batch_norm(channels, BatchNormConfig::default(), vb.pp("bn"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;
    use std::collections::HashMap;

    fn fresh(channels: usize) -> Result<(VarMap, SrmLayer)> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let layer = SrmLayer::new(channels, 16, vb)?;
        Ok((varmap, layer))
    }

    #[test]
    fn output_shape_matches_input() -> Result<()> {
        let (_varmap, layer) = fresh(6)?;
        for (n, h, w) in [(1, 2, 2), (3, 5, 7), (4, 8, 8)] {
            let xs = Tensor::randn(0f32, 1., (n, 6, h, w), &Device::Cpu)?;
            assert_eq!(layer.forward_t(&xs, false)?.dims(), &[n, 6, h, w]);
        }
        Ok(())
    }

    #[test]
    fn gate_values_lie_strictly_between_zero_and_one() -> Result<()> {
        let (_varmap, layer) = fresh(16)?;
        let xs = Tensor::randn(0f32, 3., (4, 16, 8, 8), &Device::Cpu)?;

        for train in [false, true] {
            let gate = layer.gate(&xs, train)?;
            assert_eq!(gate.dims(), &[4, 16, 1, 1]);
            for v in gate.flatten_all()?.to_vec1::<f32>()? {
                assert!(v > 0. && v < 1., "gate value {v} out of range");
            }
        }
        Ok(())
    }

    #[test]
    fn style_pool_orders_mean_before_unbiased_std() -> Result<()> {
        let xs = Tensor::new(&[1f32, 2., 3., 4., 5., 5., 5., 5.], &Device::Cpu)?
            .reshape((1, 2, 2, 2))?;
        let u = style_pool(&xs)?;
        assert_eq!(u.dims(), &[1, 2, 2]);

        let u = u.flatten_all()?.to_vec1::<f32>()?;
        let expected = [2.5, (5f32 / 3.).sqrt(), 5., 0.];
        for (got, want) in u.iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "{got} != {want}");
        }
        Ok(())
    }

    #[test]
    fn channel_weights_are_not_shared() -> Result<()> {
        // Channel 0 reads only the mean, channel 1 only the deviation.
        let dev = Device::Cpu;
        let mut tensors = HashMap::new();
        tensors.insert(
            "cfc.weight".to_string(),
            Tensor::new(&[1f32, 0., 0., 1.], &dev)?.reshape((2, 1, 2))?,
        );
        tensors.insert("bn.weight".to_string(), Tensor::ones(2, DType::F32, &dev)?);
        tensors.insert("bn.bias".to_string(), Tensor::zeros(2, DType::F32, &dev)?);
        tensors.insert("bn.running_mean".to_string(), Tensor::zeros(2, DType::F32, &dev)?);
        tensors.insert("bn.running_var".to_string(), Tensor::ones(2, DType::F32, &dev)?);
        let vb = VarBuilder::from_tensors(tensors, DType::F32, &dev);
        let layer = SrmLayer::new(2, 16, vb)?;

        // Channel 0: mean 0, std 2. Channel 1: mean 3, std 0.
        let xs = Tensor::new(&[-2f32, 2., 3., 3.], &dev)?.reshape((1, 2, 1, 2))?;
        let std0 = 8f32.sqrt();
        let gate = layer.gate(&xs, false)?.flatten_all()?.to_vec1::<f32>()?;

        let sigmoid = |v: f32| 1. / (1. + (-v).exp());
        let scale = 1. / (1. + 1e-5f32).sqrt();
        assert!((gate[0] - sigmoid(0.)).abs() < 1e-5);
        assert!((gate[1] - sigmoid(0.)).abs() < 1e-5);

        let xs = Tensor::new(&[-2f32, 2., 1., 5.], &dev)?.reshape((1, 2, 1, 2))?;
        let gate = layer.gate(&xs, false)?.flatten_all()?.to_vec1::<f32>()?;
        assert!((gate[0] - sigmoid(0.)).abs() < 1e-5);
        assert!((gate[1] - sigmoid(std0 * scale)).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn single_pixel_map_has_nan_deviation() -> Result<()> {
        let xs = Tensor::ones((3, 2, 1, 1), DType::F32, &Device::Cpu)?;

        let u = style_pool(&xs)?;
        assert_eq!(u.dims(), &[3, 2, 2]);
        for pair in u.flatten_all()?.to_vec1::<f32>()?.chunks(2) {
            assert_eq!(pair[0], 1.);
            assert!(pair[1].is_nan(), "{pair:?}");
        }

        let (_varmap, layer) = fresh(2)?;
        assert_eq!(layer.forward_t(&xs, false)?.dims(), &[3, 2, 1, 1]);
        Ok(())
    }

    #[test]
    fn single_sample_training_batch_collapses_gate_to_half() -> Result<()> {
        // Batch statistics over one sample normalize every value to zero,
        // leaving sigmoid(bias) = 0.5. Inherited from batch norm, not clamped.
        let (_varmap, layer) = fresh(4)?;
        let xs = Tensor::randn(0f32, 1., (1, 4, 6, 6), &Device::Cpu)?;
        let gate = layer.gate(&xs, true)?.flatten_all()?.to_vec1::<f32>()?;
        for v in gate {
            assert!((v - 0.5).abs() < 1e-4, "{v}");
        }
        Ok(())
    }

    #[test]
    fn registers_checkpoint_names() -> Result<()> {
        let (varmap, _layer) = fresh(5)?;
        let data = varmap.data().lock().unwrap();
        let mut names: Vec<_> = data.keys().cloned().collect();
        names.sort();
        assert_eq!(
            names,
            ["bn.bias", "bn.running_mean", "bn.running_var", "bn.weight", "cfc.weight"]
        );
        assert_eq!(data["cfc.weight"].dims(), &[5, 1, 2]);
        Ok(())
    }
}
