// ============================================================
// DMN Batch and Batcher
// ============================================================
// A batch is the feature contract of the model:
//
//   inputs        [B, N, S]  sentence token ids, 0-padded
//   inputs_len    [B]        valid sentence count per item
//   questions     [B, Q]     question token ids, 0-padded
//   questions_len [B]        valid question length per item
//   answers       [B, A]     target ids (training only), A = max_answer_len
//   answers_len   [B]        valid answer length per item
//
// `DmnBatch::new` checks those shapes agree and fails loudly when
// they do not. `DmnBatcher` builds one from raw samples with Burn's
// Batcher trait: every sentence is padded to max_sent_len, the
// sentence and question axes to the longest item in the batch,
// answers to max_answer_len. Nothing is ever truncated: a sentence
// or answer longer than its configured width is rejected.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::config::{DmnConfig, PAD_TOKEN};
use crate::data::dataset::DmnSample;
use crate::error::{DmnError, Result};

/// Target answer ids and their valid lengths.
#[derive(Debug, Clone)]
pub struct AnswerTargets<B: Backend> {
    pub ids:     Tensor<B, 2, Int>,
    pub lengths: Tensor<B, 1, Int>,
}

#[derive(Debug, Clone)]
pub struct DmnBatch<B: Backend> {
    pub inputs:        Tensor<B, 3, Int>,
    pub inputs_len:    Tensor<B, 1, Int>,
    pub questions:     Tensor<B, 2, Int>,
    pub questions_len: Tensor<B, 1, Int>,
    pub answers:       Option<AnswerTargets<B>>,
}

impl<B: Backend> DmnBatch<B> {
    /// Assemble a batch, rejecting tensors whose shapes disagree.
    pub fn new(
        inputs:        Tensor<B, 3, Int>,
        inputs_len:    Tensor<B, 1, Int>,
        questions:     Tensor<B, 2, Int>,
        questions_len: Tensor<B, 1, Int>,
        answers:       Option<AnswerTargets<B>>,
    ) -> Result<Self> {
        let [batch, num_sentences, sentence_len] = inputs.dims();
        let [_, question_len] = questions.dims();

        if batch == 0 {
            return Err(DmnError::shape("inputs", "at least one item", 0));
        }

        if num_sentences == 0 || sentence_len == 0 {
            return Err(DmnError::shape("inputs", "non-empty [B, N, S]", format!("{:?}", inputs.dims())));
        }
        if question_len == 0 {
            return Err(DmnError::shape("questions", "non-empty [B, Q]", format!("{:?}", questions.dims())));
        }
        check_batch("inputs_len", batch, inputs_len.dims()[0])?;
        check_batch("questions", batch, questions.dims()[0])?;
        check_batch("questions_len", batch, questions_len.dims()[0])?;
        check_lengths("inputs_len", &inputs_len, num_sentences)?;
        check_lengths("questions_len", &questions_len, question_len)?;

        if let Some(answers) = &answers {
            let [answer_batch, answer_len] = answers.ids.dims();
            check_batch("answers", batch, answer_batch)?;
            check_batch("answers_len", batch, answers.lengths.dims()[0])?;
            check_lengths("answers_len", &answers.lengths, answer_len)?;
        }

        Ok(Self { inputs, inputs_len, questions, questions_len, answers })
    }

    pub fn batch_size(&self) -> usize {
        self.inputs.dims()[0]
    }

    /// Check the padded widths the model was configured for.
    pub fn check_widths(&self, max_sent_len: usize, max_answer_len: usize) -> Result<()> {
        let [_, _, sentence_len] = self.inputs.dims();
        if sentence_len != max_sent_len {
            return Err(DmnError::shape("inputs sentence length", max_sent_len, sentence_len));
        }
        if let Some(answers) = &self.answers {
            let [_, answer_len] = answers.ids.dims();
            if answer_len != max_answer_len {
                return Err(DmnError::shape("answers length", max_answer_len, answer_len));
            }
        }
        Ok(())
    }
}

fn check_batch(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(DmnError::shape(what, format!("batch dimension {expected}"), got));
    }
    Ok(())
}

fn check_lengths<B: Backend>(what: &'static str, lengths: &Tensor<B, 1, Int>, axis: usize) -> Result<()> {
    let max: i64 = lengths.clone().max().into_scalar().elem::<i64>();
    let min: i64 = lengths.clone().min().into_scalar().elem::<i64>();
    if min < 0 || max > axis as i64 {
        return Err(DmnError::shape(what, format!("lengths within 0..={axis}"), format!("{min}..={max}")));
    }
    Ok(())
}

#[derive(Clone, Debug)]
pub struct DmnBatcher<B: Backend> {
    pub device:         B::Device,
    pub max_sent_len:   usize,
    pub max_answer_len: usize,
}

impl<B: Backend> DmnBatcher<B> {
    pub fn new(config: &DmnConfig, device: B::Device) -> Self {
        Self {
            device,
            max_sent_len:   config.max_sent_len,
            max_answer_len: config.max_answer_len,
        }
    }

    /// Like `Batcher::batch`, but surfaces shape errors instead of panicking.
    pub fn try_batch(&self, items: Vec<DmnSample>) -> Result<DmnBatch<B>> {
        if items.is_empty() {
            return Err(DmnError::shape("samples", "at least one item", 0));
        }
        for item in &items {
            if let Some(sentence) = item.sentences.iter().find(|s| s.len() > self.max_sent_len) {
                return Err(DmnError::shape(
                    "sentence length",
                    format!("at most {}", self.max_sent_len),
                    sentence.len(),
                ));
            }
            if let Some(answer) = item.answer.as_ref().filter(|a| a.len() > self.max_answer_len) {
                return Err(DmnError::shape(
                    "answer length",
                    format!("at most {}", self.max_answer_len),
                    answer.len(),
                ));
            }
        }

        let batch_size    = items.len();
        let num_sentences = items.iter().map(DmnSample::fact_count).max().unwrap_or(0).max(1);
        let question_len  = items.iter().map(|s| s.question.len()).max().unwrap_or(0).max(1);

        // ── Sentences: [B, N, S] ─────────────────────────────────────────────
        let mut inputs_flat = Vec::with_capacity(batch_size * num_sentences * self.max_sent_len);
        let mut inputs_len  = Vec::with_capacity(batch_size);
        for item in &items {
            for sentence in &item.sentences {
                pad_into(&mut inputs_flat, sentence, self.max_sent_len);
            }
            for _ in item.sentences.len()..num_sentences {
                pad_into(&mut inputs_flat, &[], self.max_sent_len);
            }
            inputs_len.push(item.sentences.len() as i32);
        }

        // ── Questions: [B, Q] ────────────────────────────────────────────────
        let mut questions_flat = Vec::with_capacity(batch_size * question_len);
        let questions_len: Vec<i32> = items.iter().map(|s| s.question.len() as i32).collect();
        for item in &items {
            pad_into(&mut questions_flat, &item.question, question_len);
        }

        // ── Answers: [B, A], only when every item carries one ────────────────
        let answers = if items.iter().all(|s| s.answer.is_some()) {
            let mut answers_flat = Vec::with_capacity(batch_size * self.max_answer_len);
            let mut answers_len  = Vec::with_capacity(batch_size);
            for answer in items.iter().filter_map(|s| s.answer.as_ref()) {
                pad_into(&mut answers_flat, answer, self.max_answer_len);
                answers_len.push(answer.len() as i32);
            }
            Some(AnswerTargets {
                ids: Tensor::<B, 1, Int>::from_ints(answers_flat.as_slice(), &self.device)
                    .reshape([batch_size, self.max_answer_len]),
                lengths: Tensor::from_ints(answers_len.as_slice(), &self.device),
            })
        } else {
            if items.iter().any(|s| s.answer.is_some()) {
                tracing::warn!("dropping answers: batch of {} mixes labelled and unlabelled items", batch_size);
            }
            None
        };

        DmnBatch::new(
            Tensor::<B, 1, Int>::from_ints(inputs_flat.as_slice(), &self.device)
                .reshape([batch_size, num_sentences, self.max_sent_len]),
            Tensor::from_ints(inputs_len.as_slice(), &self.device),
            Tensor::<B, 1, Int>::from_ints(questions_flat.as_slice(), &self.device)
                .reshape([batch_size, question_len]),
            Tensor::from_ints(questions_len.as_slice(), &self.device),
            answers,
        )
    }
}

impl<B: Backend> Batcher<DmnSample, DmnBatch<B>> for DmnBatcher<B> {
    fn batch(&self, items: Vec<DmnSample>) -> DmnBatch<B> {
        match self.try_batch(items) {
            Ok(batch) => batch,
            Err(err) => panic!("cannot batch DMN samples: {err}"),
        }
    }
}

/// Append `tokens` 0-padded to `width` entries. Callers check `tokens.len() <= width`.
fn pad_into(out: &mut Vec<i32>, tokens: &[u32], width: usize) {
    out.extend(tokens.iter().map(|&t| t as i32));
    out.extend(std::iter::repeat(PAD_TOKEN as i32).take(width.saturating_sub(tokens.len())));
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn ints<const D: usize>(t: Tensor<TestBackend, D, Int>) -> Vec<i64> {
        t.into_data().convert::<i64>().to_vec().unwrap()
    }

    fn batcher() -> DmnBatcher<TestBackend> {
        let config = DmnConfig::new(20, 3, 3, 1, 2);
        DmnBatcher::new(&config, Default::default())
    }

    #[test]
    fn test_pads_every_axis() {
        let items = vec![
            DmnSample::new(vec![vec![3, 4], vec![5, 6, 7]], vec![8, 9], vec![10, 2]),
            DmnSample::new(vec![vec![11]], vec![12], vec![13, 14, 2]),
        ];
        let batch = batcher().batch(items);

        assert_eq!(batch.inputs.dims(), [2, 2, 3]);
        assert_eq!(ints(batch.inputs), vec![3, 4, 0, 5, 6, 7, 11, 0, 0, 0, 0, 0]);
        assert_eq!(ints(batch.inputs_len), vec![2, 1]);
        assert_eq!(ints(batch.questions), vec![8, 9, 12, 0]);
        assert_eq!(ints(batch.questions_len), vec![2, 1]);

        let answers = batch.answers.expect("labelled batch");
        assert_eq!(ints(answers.ids), vec![10, 2, 0, 13, 14, 2]);
        assert_eq!(ints(answers.lengths), vec![2, 3]);
    }

    #[test]
    fn test_rejects_long_sentences() {
        let items = vec![DmnSample::new(vec![vec![3, 4, 5, 6, 7]], vec![8], vec![2])];
        let result = batcher().try_batch(items);
        assert!(matches!(result, Err(DmnError::ShapeMismatch { what: "sentence length", .. })));
    }

    #[test]
    fn test_rejects_long_answers_instead_of_dropping_end_token() {
        let items = vec![DmnSample::new(vec![vec![3]], vec![6], vec![3, 4, 5, 6, 7, 2])];
        let result = batcher().try_batch(items);
        assert!(matches!(result, Err(DmnError::ShapeMismatch { what: "answer length", .. })));
    }

    #[test]
    fn test_answer_filling_width_is_kept_whole() {
        let items = vec![DmnSample::new(vec![vec![3]], vec![6], vec![4, 5, 2])];
        let batch = batcher().try_batch(items).unwrap();
        assert_eq!(batch.batch_size(), 1);
        let answers = batch.answers.expect("labelled batch");
        assert_eq!(ints(answers.ids), vec![4, 5, 2]);
        assert_eq!(ints(answers.lengths), vec![3]);
    }

    #[test]
    fn test_empty_batch_is_an_error() {
        let result = batcher().try_batch(vec![]);
        assert!(matches!(result, Err(DmnError::ShapeMismatch { what: "samples", .. })));

        let device = Default::default();
        let result = DmnBatch::<TestBackend>::new(
            Tensor::zeros([0, 2, 3], &device),
            Tensor::zeros([0], &device),
            Tensor::zeros([0, 4], &device),
            Tensor::zeros([0], &device),
            None,
        );
        assert!(matches!(result, Err(DmnError::ShapeMismatch { what: "inputs", .. })));
    }

    #[test]
    fn test_unlabelled_items_drop_answers() {
        let items = vec![
            DmnSample::new(vec![vec![3]], vec![8], vec![2]),
            DmnSample::unlabelled(vec![vec![4]], vec![9]),
        ];
        assert!(batcher().batch(items).answers.is_none());
    }

    #[test]
    fn test_new_rejects_mismatched_batch() {
        let device = Default::default();
        let result = DmnBatch::<TestBackend>::new(
            Tensor::zeros([2, 2, 3], &device),
            Tensor::zeros([2], &device),
            Tensor::zeros([3, 4], &device),
            Tensor::zeros([3], &device),
            None,
        );
        assert!(matches!(result, Err(DmnError::ShapeMismatch { what: "questions", .. })));
    }

    #[test]
    fn test_new_rejects_lengths_past_axis() {
        let device = Default::default();
        let result = DmnBatch::<TestBackend>::new(
            Tensor::zeros([1, 2, 3], &device),
            Tensor::from_ints([5], &device),
            Tensor::zeros([1, 4], &device),
            Tensor::from_ints([4], &device),
            None,
        );
        assert!(matches!(result, Err(DmnError::ShapeMismatch { what: "inputs_len", .. })));
    }

    #[test]
    fn test_check_widths() {
        let batch = batcher().batch(vec![DmnSample::new(vec![vec![3]], vec![8], vec![2])]);
        assert!(batch.check_widths(3, 3).is_ok());
        assert!(batch.check_widths(4, 3).is_err());
        assert!(batch.check_widths(3, 5).is_err());
    }
}
