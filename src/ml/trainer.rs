// ============================================================
// Training Step
// ============================================================
// One optimisation step on one batch:
//
//   1. teacher-forced forward pass → logits [B, T, vocab]
//   2. sequence loss (mean token cross-entropy)
//   3. backward pass → GradientsParams
//   4. clip the global gradient norm to `clip_norm`
//   5. Adam update
//
// Epoch iteration, shuffling and checkpoint cadence belong to the
// caller; this type only owns the optimiser state between steps.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use std::marker::PhantomData;

use anyhow::{Context, Result};
use burn::{
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::config::{DmnConfig, LossWeighting};
use crate::data::batcher::DmnBatch;
use crate::ml::clip::{clip_by_global_norm, clip_scale};
use crate::ml::model::Dmn;

/// What one step measured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub loss:      f64,
    /// Global gradient norm before clipping.
    pub grad_norm: f64,
    pub clipped:   bool,
}

impl StepReport {
    /// `clipped` is true only when the gradients were actually rescaled;
    /// a non-finite norm leaves them untouched.
    pub fn new(loss: f64, grad_norm: f64, clip_norm: f64) -> Self {
        Self { loss, grad_norm, clipped: clip_scale(grad_norm, clip_norm) < 1.0 }
    }
}

pub struct DmnTrainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Dmn<B>, B>,
{
    optim:         O,
    learning_rate: f64,
    clip_norm:     f64,
    weighting:     LossWeighting,
    steps:         usize,
    _backend:      PhantomData<B>,
}

impl<B, O> DmnTrainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Dmn<B>, B>,
{
    pub fn new(config: &DmnConfig, optim: O) -> Self {
        Self {
            optim,
            learning_rate: config.learning_rate,
            clip_norm:     config.clip_norm,
            weighting:     config.loss_weighting,
            steps:         0,
            _backend:      PhantomData,
        }
    }

    /// Number of optimiser updates applied so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Forward, backward, clip and update. Returns the updated model.
    pub fn step(&mut self, model: Dmn<B>, batch: &DmnBatch<B>) -> Result<(Dmn<B>, StepReport)> {
        let (loss, _) = model
            .forward_loss(batch, self.weighting)
            .context("training forward pass failed")?;
        let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        let (grads, grad_norm) = clip_by_global_norm::<B, _>(&model, grads, self.clip_norm);

        let model = self.optim.step(self.learning_rate, model, grads);
        self.steps += 1;

        let report = StepReport::new(loss_val, grad_norm, self.clip_norm);
        if !grad_norm.is_finite() {
            tracing::warn!("step {}: non-finite gradient norm, update applied unclipped", self.steps);
        }
        tracing::debug!(
            "step {} | loss={:.4} | grad_norm={:.4}{}",
            self.steps, report.loss, report.grad_norm,
            if report.clipped { " (clipped)" } else { "" },
        );
        Ok((model, report))
    }
}

/// Adam with the default moments, as the DMN is usually trained.
pub fn adam_trainer<B: AutodiffBackend>(
    config: &DmnConfig,
) -> DmnTrainer<B, impl Optimizer<Dmn<B>, B>> {
    let optim = AdamConfig::new().with_epsilon(1e-8).init::<B, Dmn<B>>();
    DmnTrainer::new(config, optim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::DmnBatcher;
    use crate::data::dataset::DmnSample;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn setup() -> (DmnConfig, Dmn<TestBackend>, DmnBatch<TestBackend>) {
        let device = Default::default();
        let cfg = DmnConfig::new(12, 3, 3, 1, 2)
            .with_embed_dim(8)
            .with_hidden_size(8)
            .with_dropout(0.0)
            .with_learning_rate(1e-2);
        let model = cfg.init(&device).unwrap();
        let batch = DmnBatcher::new(&cfg, device)
            .try_batch(vec![
                DmnSample::new(vec![vec![3, 4], vec![5]], vec![6, 7], vec![8, 2]),
                DmnSample::new(vec![vec![9]], vec![10], vec![11, 2]),
            ])
            .unwrap();
        (cfg, model, batch)
    }

    #[test]
    fn test_step_updates_parameters() {
        let (cfg, model, batch) = setup();
        let mut trainer = adam_trainer::<TestBackend>(&cfg);

        let before: Vec<f32> = model.decoder.output.weight.val().into_data().to_vec().unwrap();
        let (model, report) = trainer.step(model, &batch).unwrap();
        let after: Vec<f32> = model.decoder.output.weight.val().into_data().to_vec().unwrap();

        assert!(report.loss.is_finite() && report.loss > 0.0);
        assert!(report.grad_norm > 0.0);
        assert_ne!(before, after);
        assert_eq!(trainer.steps(), 1);
    }

    #[test]
    fn test_repeated_steps_reduce_loss() {
        let (cfg, mut model, batch) = setup();
        let mut trainer = adam_trainer::<TestBackend>(&cfg);

        let mut first = None;
        let mut last = 0.0;
        for _ in 0..30 {
            let (next, report) = trainer.step(model, &batch).unwrap();
            model = next;
            first.get_or_insert(report.loss);
            last = report.loss;
        }
        assert!(last < first.unwrap());
    }

    #[test]
    fn test_report_flags_only_real_clipping() {
        assert!(StepReport::new(1.0, 10.0, 5.0).clipped);
        assert!(!StepReport::new(1.0, 2.0, 5.0).clipped);
        assert!(!StepReport::new(1.0, f64::INFINITY, 5.0).clipped);
        assert!(!StepReport::new(1.0, f64::NAN, 5.0).clipped);
    }

    #[test]
    fn test_step_without_answers_fails() {
        let (cfg, model, _) = setup();
        let batch = DmnBatcher::new(&cfg, Default::default())
            .try_batch(vec![DmnSample::unlabelled(vec![vec![3]], vec![6])])
            .unwrap();
        let mut trainer = adam_trainer::<TestBackend>(&cfg);
        assert!(trainer.step(model, &batch).is_err());
    }
}
