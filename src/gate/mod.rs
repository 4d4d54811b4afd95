//! Per-channel gates that a residual block can insert between its main
//! path and the residual addition.
//!
//! A gate is picked at the type level: blocks are generic over
//! [`ChannelGate`] and build their gate through [`ChannelGate::new`], so
//! the block topology never has to know which gate it carries.
//! [`NoGate`] fills the slot when no recalibration is wanted.

pub mod squeeze_excitation;
pub mod srm;

use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::VarBuilder;

pub use squeeze_excitation::SeLayer;
pub use srm::SrmLayer;

pub trait ChannelGate: ModuleT + std::fmt::Debug + Sized {
    /// `reduction` is passed to every gate; gates without a bottleneck
    /// ignore it.
    fn new(channels: usize, reduction: usize, vb: VarBuilder) -> Result<Self>;
}

/// Empty gate slot. Owns no parameters and returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGate;

impl Module for NoGate {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        Ok(xs.clone())
    }
}

impl ChannelGate for NoGate {
    fn new(_channels: usize, _reduction: usize, _vb: VarBuilder) -> Result<Self> {
        Ok(NoGate)
    }
}
