// ============================================================
// Global-Norm Gradient Clipping
// ============================================================
// Burn's built-in clipping works per parameter tensor. The DMN is
// trained with clipping over the *global* norm instead:
//
//   n = sqrt( Σ_p ||g_p||² )
//   g_p ← g_p * clip / max(n, clip)
//
// so the direction of the full update is preserved and only its
// length is capped. Gradients are found by walking the module's
// parameters with a ModuleVisitor, the same way
// GradientsParams::from_grads collects them.
//
// Reference: Pascanu et al. (2013) On the difficulty of training RNNs

use std::marker::PhantomData;

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

struct SquaredNorm<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    total: f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.total += (grad.clone() * grad).sum().into_scalar().elem::<f64>();
        }
    }
}

struct Rescale<'a, B: AutodiffBackend> {
    grads: &'a mut GradientsParams,
    scale: f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Rescale<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register::<B::InnerBackend, D>(id, grad.mul_scalar(self.scale));
        }
    }
}

/// L2 norm of all of `module`'s gradients taken together.
pub fn global_norm<B, M>(module: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = SquaredNorm::<B> { grads, total: 0.0, _backend: PhantomData };
    module.visit(&mut visitor);
    visitor.total.sqrt()
}

/// Factor that brings `norm` down to at most `max_norm`.
pub fn clip_scale(norm: f64, max_norm: f64) -> f64 {
    if norm > max_norm && norm.is_finite() {
        max_norm / norm
    } else {
        1.0
    }
}

/// Rescale `grads` so their global norm is at most `max_norm`.
///
/// Returns the clipped gradients and the norm measured before clipping.
pub fn clip_by_global_norm<B, M>(module: &M, grads: GradientsParams, max_norm: f64) -> (GradientsParams, f64)
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut grads = grads;
    let norm = global_norm::<B, M>(module, &grads);
    let scale = clip_scale(norm, max_norm);
    if scale < 1.0 {
        let mut visitor = Rescale::<B> { grads: &mut grads, scale, _backend: PhantomData };
        module.visit(&mut visitor);
    }
    (grads, norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DmnConfig, LossWeighting};
    use crate::data::batcher::DmnBatcher;
    use crate::data::dataset::DmnSample;
    use crate::ml::model::Dmn;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_clip_scale() {
        assert_eq!(clip_scale(2.0, 5.0), 1.0);
        assert_eq!(clip_scale(10.0, 5.0), 0.5);
        assert_eq!(clip_scale(f64::INFINITY, 5.0), 1.0);
    }

    #[test]
    fn test_large_gradient_is_clipped_to_threshold() {
        let device = Default::default();
        let cfg = DmnConfig::new(12, 3, 3, 1, 2)
            .with_embed_dim(8)
            .with_hidden_size(8)
            .with_dropout(0.0);
        let model: Dmn<TestBackend> = cfg.init(&device).unwrap();
        let batch = DmnBatcher::new(&cfg, device)
            .try_batch(vec![DmnSample::new(vec![vec![3, 4], vec![5]], vec![6, 7], vec![8, 2])])
            .unwrap();

        let (loss, _) = model.forward_loss(&batch, LossWeighting::Uniform).unwrap();
        // blow the gradient up far past the threshold
        let grads = (loss * 1.0e6).backward();
        let grads = GradientsParams::from_grads(grads, &model);

        let (clipped, before) = clip_by_global_norm::<TestBackend, _>(&model, grads, 1.0);
        assert!(before > 1.0);
        let after = global_norm::<TestBackend, _>(&model, &clipped);
        assert!(after <= 1.0 + 1e-3, "post-clip norm {after}");
        assert!(after > 0.9);
    }
}
