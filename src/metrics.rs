//! Ranking helpers for classifier logits.

use candle_core::{DType, Tensor};

use crate::{Result, SrmResNetError};

/// Per row of a (N, K) logits tensor, the `k` highest scoring classes as
/// (class, score), best first. Ties keep the lower class index first.
pub fn top_k(logits: &Tensor, k: usize) -> candle_core::Result<Vec<Vec<(usize, f32)>>> {
    let rows = logits.to_dtype(DType::F32)?.to_vec2::<f32>()?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let mut ranked: Vec<(usize, f32)> = row.into_iter().enumerate().collect();
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
            ranked.truncate(k);
            ranked
        })
        .collect())
}

/// Running top-1 / top-5 accuracy over labelled batches.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Accuracy {
    seen: usize,
    top1: usize,
    top5: usize,
}

impl Accuracy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, logits: &Tensor, labels: &[u32]) -> Result<()> {
        let ranked = top_k(logits, 5)?;
        if ranked.len() != labels.len() {
            return Err(SrmResNetError::Msg(format!(
                "{} logit rows for {} labels",
                ranked.len(),
                labels.len()
            )));
        }

        for (row, label) in ranked.iter().zip(labels) {
            let label = *label as usize;
            if row.first().map(|(class, _)| *class) == Some(label) {
                self.top1 += 1;
            }
            if row.iter().any(|(class, _)| *class == label) {
                self.top5 += 1;
            }
        }
        self.seen += labels.len();
        Ok(())
    }

    pub fn seen(&self) -> usize {
        self.seen
    }

    pub fn top1(&self) -> f64 {
        ratio(self.top1, self.seen)
    }

    pub fn top5(&self) -> f64 {
        ratio(self.top5, self.seen)
    }
}

fn ratio(hits: usize, seen: usize) -> f64 {
    if seen == 0 {
        0.
    } else {
        hits as f64 / seen as f64
    }
}
