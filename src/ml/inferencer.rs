// ============================================================
// Inferencer
// ============================================================
use anyhow::{Context, Result};
use burn::{
    module::AutodiffModule,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::batcher::DmnBatch;
use crate::ml::model::Dmn;

/// Greedy answering with a trained model on a non-autodiff backend.
pub struct Inferencer<B: Backend> {
    model: Dmn<B>,
}

impl<B: Backend> Inferencer<B> {
    pub fn new(model: Dmn<B>) -> Self {
        Self { model }
    }

    /// Drop the autodiff graph from a trained model; dropout is disabled.
    pub fn from_trained<AD>(model: Dmn<AD>) -> Self
    where
        AD: AutodiffBackend<InnerBackend = B>,
    {
        Self::new(model.valid())
    }

    pub fn model(&self) -> &Dmn<B> {
        &self.model
    }

    /// Raw greedy ids `[B, <= max_answer_len]`.
    pub fn predict_ids(&self, batch: &DmnBatch<B>) -> Result<Tensor<B, 2, Int>> {
        self.model
            .forward_predict(batch)
            .context("greedy decoding failed")
    }

    /// One answer per item, cut before the first end token.
    pub fn predict(&self, batch: &DmnBatch<B>) -> Result<Vec<Vec<u32>>> {
        let ids = self.predict_ids(batch)?;
        let [batch_size, steps] = ids.dims();
        let flat: Vec<i64> = ids
            .into_data()
            .convert::<i64>()
            .to_vec()
            .map_err(|e| anyhow::anyhow!("cannot read predicted ids: {e:?}"))?;

        let end = self.model.end_token as i64;
        let answers: Vec<Vec<u32>> = (0..batch_size)
            .map(|row| {
                flat[row * steps..(row + 1) * steps]
                    .iter()
                    .take_while(|&&id| id != end)
                    .map(|&id| id as u32)
                    .collect()
            })
            .collect();

        tracing::debug!("Decoded {} answers in {} steps", batch_size, steps);
        Ok(answers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DmnConfig;
    use crate::data::batcher::DmnBatcher;
    use crate::data::dataset::DmnSample;
    use crate::ml::trainer::adam_trainer;
    use burn::backend::{Autodiff, NdArray};

    type TrainBackend = Autodiff<NdArray>;

    fn config() -> DmnConfig {
        DmnConfig::new(12, 3, 4, 1, 2)
            .with_embed_dim(8)
            .with_hidden_size(8)
            .with_dropout(0.0)
            .with_learning_rate(2e-2)
    }

    #[test]
    fn test_answers_stop_before_end_token() {
        let device = Default::default();
        let cfg = config();
        let model: Dmn<NdArray> = cfg.init(&device).unwrap();
        let inferencer = Inferencer::new(model);
        let batch = DmnBatcher::new(&cfg, device)
            .try_batch(vec![
                DmnSample::unlabelled(vec![vec![3, 4]], vec![5]),
                DmnSample::unlabelled(vec![vec![6], vec![7, 8]], vec![9, 10]),
            ])
            .unwrap();

        let raw = inferencer.predict_ids(&batch).unwrap();
        let answers = inferencer.predict(&batch).unwrap();
        assert_eq!(answers.len(), 2);
        let [_, steps] = raw.dims();
        let end = inferencer.model().end_token as u32;
        for answer in answers {
            assert!(answer.len() <= steps);
            assert!(!answer.contains(&end));
        }
    }

    #[test]
    fn test_trained_model_learns_single_answer() {
        let device = Default::default();
        let cfg = config();
        let mut model: Dmn<TrainBackend> = cfg.init(&device).unwrap();
        let sample = DmnSample::new(vec![vec![3, 4], vec![5, 6]], vec![7, 8], vec![9, 2]);
        let batch = DmnBatcher::<TrainBackend>::new(&cfg, device)
            .try_batch(vec![sample.clone()])
            .unwrap();

        let mut trainer = adam_trainer::<TrainBackend>(&cfg);
        for _ in 0..200 {
            let (next, _) = trainer.step(model, &batch).unwrap();
            model = next;
        }

        let inferencer = Inferencer::<NdArray>::from_trained(model);
        let query = DmnBatcher::<NdArray>::new(&cfg, device)
            .try_batch(vec![DmnSample::unlabelled(sample.sentences, sample.question)])
            .unwrap();
        assert_eq!(inferencer.predict(&query).unwrap(), vec![vec![9]]);
    }
}
