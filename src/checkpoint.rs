//! Strict safetensors checkpoints for a [`VarMap`].
//!
//! A load either overwrites every variable or none: the whole file is read
//! and checked against the map, each tensor is converted to its target
//! dtype and device, and only then are the variables assigned.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use candle_core::{Device, Tensor, Var};
use candle_nn::VarMap;

use crate::{Result, SrmResNetError};

/// Checkpoint entries with these suffixes carry state this crate does not
/// keep (batch norm step counters) and are skipped.
const IGNORED_SUFFIXES: [&str; 1] = [".num_batches_tracked"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeMismatch {
    pub name: String,
    pub expected: Vec<usize>,
    pub found: Vec<usize>,
}

/// Every difference between a checkpoint and the variables it should fill.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointReport {
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
    pub mismatched: Vec<ShapeMismatch>,
}

impl CheckpointReport {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.mismatched.is_empty()
    }

    /// Compares `tensors` with `vars` by name and shape.
    pub fn compare(vars: &HashMap<String, Var>, tensors: &HashMap<String, Tensor>) -> Self {
        let mut report = CheckpointReport::default();

        for (name, var) in vars.iter() {
            match tensors.get(name) {
                None => report.missing.push(name.clone()),
                Some(tensor) if tensor.dims() != var.dims() => {
                    report.mismatched.push(ShapeMismatch {
                        name: name.clone(),
                        expected: var.dims().to_vec(),
                        found: tensor.dims().to_vec(),
                    })
                }
                Some(_) => {}
            }
        }
        report.unexpected = tensors
            .keys()
            .filter(|name| !vars.contains_key(*name))
            .filter(|name| !IGNORED_SUFFIXES.iter().any(|s| name.ends_with(s)))
            .cloned()
            .collect();

        report.missing.sort();
        report.unexpected.sort();
        report.mismatched.sort_by(|a, b| a.name.cmp(&b.name));
        report
    }
}

impl fmt::Display for CheckpointReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![];
        if !self.missing.is_empty() {
            parts.push(format!("missing {}", self.missing.join(", ")));
        }
        if !self.unexpected.is_empty() {
            parts.push(format!("unexpected {}", self.unexpected.join(", ")));
        }
        for m in self.mismatched.iter() {
            parts.push(format!(
                "{}: expected shape {:?}, found {:?}",
                m.name, m.expected, m.found
            ));
        }
        write!(f, "{}", parts.join("; "))
    }
}

/// Overwrites every variable in `varmap` from the safetensors file at `path`.
///
/// Fails with [`SrmResNetError::CheckpointMismatch`] if any name is missing or
/// extra, or any shape differs; in that case no variable is modified.
pub fn load_strict<P: AsRef<Path>>(varmap: &VarMap, path: P, device: &Device) -> Result<()> {
    let path = path.as_ref();
    let tensors = candle_core::safetensors::load(path, device)?;

    let vars = varmap
        .data()
        .lock()
        .map_err(|_| SrmResNetError::Msg("parameter map lock poisoned".to_string()))?;

    let report = CheckpointReport::compare(&vars, &tensors);
    if !report.is_empty() {
        return Err(SrmResNetError::CheckpointMismatch {
            path: path.display().to_string(),
            report,
        });
    }

    let mut staged = Vec::with_capacity(vars.len());
    for (name, var) in vars.iter() {
        let tensor = tensors
            .get(name)
            .ok_or_else(|| SrmResNetError::Msg(format!("{name} vanished from checkpoint")))?;
        staged.push((var, tensor.to_dtype(var.dtype())?.to_device(var.device())?));
    }

    for (var, tensor) in staged {
        var.set(&tensor)?;
    }

    log::info!("Loaded {} tensors from {}", vars.len(), path.display());
    Ok(())
}

/// Writes every variable in `varmap` to `path`.
pub fn save<P: AsRef<Path>>(varmap: &VarMap, path: P) -> Result<()> {
    let path = path.as_ref();
    varmap.save(path)?;
    log::info!("Saved {} tensors to {}", varmap.all_vars().len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    fn vars(entries: &[(&str, &[usize])]) -> candle_core::Result<HashMap<String, Var>> {
        entries
            .iter()
            .map(|(name, dims)| Ok((name.to_string(), Var::zeros(*dims, DType::F32, &Device::Cpu)?)))
            .collect()
    }

    fn tensors(entries: &[(&str, &[usize])]) -> candle_core::Result<HashMap<String, Tensor>> {
        entries
            .iter()
            .map(|(name, dims)| Ok((name.to_string(), Tensor::zeros(*dims, DType::F32, &Device::Cpu)?)))
            .collect()
    }

    #[test]
    fn matching_checkpoint_has_empty_report() -> candle_core::Result<()> {
        let layout: &[(&str, &[usize])] = &[("fc.weight", &[10, 64]), ("fc.bias", &[10])];
        let report = CheckpointReport::compare(&vars(layout)?, &tensors(layout)?);
        assert!(report.is_empty());
        assert_eq!(report.to_string(), "");
        Ok(())
    }

    #[test]
    fn report_lists_every_discrepancy() -> candle_core::Result<()> {
        let expected = vars(&[("fc.weight", &[10, 64]), ("fc.bias", &[10]), ("bn1.weight", &[16])])?;
        let found = tensors(&[
            ("fc.weight", &[10, 32]),
            ("bn1.weight", &[16]),
            ("bn1.num_batches_tracked", &[]),
            ("head.weight", &[4]),
        ])?;

        let report = CheckpointReport::compare(&expected, &found);
        assert_eq!(report.missing, ["fc.bias"]);
        assert_eq!(report.unexpected, ["head.weight"]);
        assert_eq!(
            report.mismatched,
            [ShapeMismatch {
                name: "fc.weight".to_string(),
                expected: vec![10, 64],
                found: vec![10, 32],
            }]
        );
        assert_eq!(
            report.to_string(),
            "missing fc.bias; unexpected head.weight; fc.weight: expected shape [10, 64], found [10, 32]"
        );
        Ok(())
    }
}
