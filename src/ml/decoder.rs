// ============================================================
// Answer Decoder
// ============================================================
// h_0 = W_init [memory ‖ q] + b_init        (no activation)
// each step:
//   x_t      = embed(next input id)          shared table
//   h_t      = GRU(x_t, h_{t-1})
//   logits_t = W_out h_t + b_out             [B, vocab]
//
// Both decoding modes run through `unroll`; they differ only in
// where the next input id comes from, which is the job of a
// `StepInput`:
//
//   TeacherForcing  next id = ground truth shifted right by one
//   Greedy          next id = arg-max of the previous step,
//                   stops once every item emitted <end> or the
//                   step cap is hit

use burn::{
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::*,
};

use crate::ml::embedding::SharedEmbedding;
use crate::ml::gru::GruCell;

/// Source of each decoding step's input token ids.
pub trait StepInput<B: Backend> {
    /// Input ids `[B]` for the first step.
    fn first(&mut self, batch: usize, device: &B::Device) -> Tensor<B, 1, Int>;

    /// Input ids for the step after `step`, given that step's arg-max
    /// ids; `None` ends decoding.
    fn next(&mut self, step: usize, predicted: Tensor<B, 1, Int>) -> Option<Tensor<B, 1, Int>>;
}

/// Feeds the ground-truth previous token.
pub struct TeacherForcing<B: Backend> {
    inputs: Tensor<B, 2, Int>,
}

impl<B: Backend> TeacherForcing<B> {
    /// `targets`: `[B, T]` answer ids; the inputs become `[<start>, y_0 .. y_{T-2}]`.
    pub fn new(targets: Tensor<B, 2, Int>, start_token: usize) -> Self {
        Self { inputs: shift_right(targets, start_token) }
    }

    fn column(&self, t: usize) -> Tensor<B, 1, Int> {
        let [batch, _] = self.inputs.dims();
        self.inputs.clone().slice([0..batch, t..t + 1]).reshape([batch])
    }
}

impl<B: Backend> StepInput<B> for TeacherForcing<B> {
    fn first(&mut self, _batch: usize, _device: &B::Device) -> Tensor<B, 1, Int> {
        self.column(0)
    }

    fn next(&mut self, step: usize, _predicted: Tensor<B, 1, Int>) -> Option<Tensor<B, 1, Int>> {
        let [_, steps] = self.inputs.dims();
        (step + 1 < steps).then(|| self.column(step + 1))
    }
}

/// Feeds back the previous step's arg-max token.
pub struct Greedy<B: Backend> {
    start_token: usize,
    end_token:   usize,
    max_steps:   usize,
    finished:    Option<Tensor<B, 1>>,
}

impl<B: Backend> Greedy<B> {
    pub fn new(start_token: usize, end_token: usize, max_steps: usize) -> Self {
        Self { start_token, end_token, max_steps, finished: None }
    }
}

impl<B: Backend> StepInput<B> for Greedy<B> {
    fn first(&mut self, batch: usize, device: &B::Device) -> Tensor<B, 1, Int> {
        self.finished = Some(Tensor::zeros([batch], device));
        Tensor::full([batch], self.start_token as i64, device)
    }

    fn next(&mut self, step: usize, predicted: Tensor<B, 1, Int>) -> Option<Tensor<B, 1, Int>> {
        let [batch] = predicted.dims();
        let hit = predicted.clone().equal_elem(self.end_token as i64).float();
        let finished = match self.finished.take() {
            Some(done) => (done + hit).clamp_max(1.0),
            None => hit,
        };
        let done: f64 = finished.clone().sum().into_scalar().elem::<f64>();
        self.finished = Some(finished);

        if done >= batch as f64 || step + 1 >= self.max_steps {
            return None;
        }
        Some(predicted)
    }
}

/// Per-step outputs of one decoding run.
#[derive(Debug, Clone)]
pub struct DecodeOutput<B: Backend> {
    /// `[B, T, vocab]`
    pub logits:     Tensor<B, 3>,
    /// `[B, T]`
    pub sample_ids: Tensor<B, 2, Int>,
}

#[derive(Module, Debug)]
pub struct AnswerDecoder<B: Backend> {
    pub init_state: Linear<B>,
    pub cell:       GruCell<B>,
    pub output:     Linear<B>,
    pub dropout:    Dropout,
}

impl<B: Backend> AnswerDecoder<B> {
    pub fn new(
        embed_dim:   usize,
        hidden_size: usize,
        vocab_size:  usize,
        dropout:     f64,
        device:      &B::Device,
    ) -> Self {
        Self {
            init_state: LinearConfig::new(2 * hidden_size, hidden_size).init(device),
            cell:       GruCell::new(embed_dim, hidden_size, device),
            output:     LinearConfig::new(hidden_size, vocab_size).init(device),
            dropout:    DropoutConfig::new(dropout).init(),
        }
    }

    /// Decoder start state from the final memory and the question vector.
    pub fn initial_state(&self, memory: Tensor<B, 2>, question: Tensor<B, 2>, training: bool) -> Tensor<B, 2> {
        let memory = if training { self.dropout.forward(memory) } else { memory };
        self.init_state.forward(Tensor::cat(vec![memory, question], 1))
    }

    /// Advance the GRU until `source` says stop.
    pub fn unroll<S: StepInput<B>>(
        &self,
        embedding: &SharedEmbedding<B>,
        state:     Tensor<B, 2>,
        source:    &mut S,
    ) -> DecodeOutput<B> {
        let [batch, _] = state.dims();
        let device = state.device();

        let mut state = state;
        let mut input = source.first(batch, &device);
        let mut logits = Vec::new();
        let mut sample_ids = Vec::new();

        let mut step = 0;
        loop {
            let x: Tensor<B, 2> = embedding.lookup(input);
            state = self.cell.forward(x, state);
            let step_logits = self.output.forward(state.clone());
            let predicted = step_logits.clone().argmax(1).reshape([batch]);

            logits.push(step_logits);
            sample_ids.push(predicted.clone());
            tracing::trace!("decode step {}", step);

            match source.next(step, predicted) {
                Some(next) => input = next,
                None => break,
            }
            step += 1;
        }

        DecodeOutput {
            logits:     Tensor::stack(logits, 1),
            sample_ids: Tensor::stack(sample_ids, 1),
        }
    }

    /// Teacher-forced logits `[B, T, vocab]` over the full target width.
    pub fn forward_train(
        &self,
        embedding:   &SharedEmbedding<B>,
        memory:      Tensor<B, 2>,
        question:    Tensor<B, 2>,
        targets:     Tensor<B, 2, Int>,
        start_token: usize,
    ) -> Tensor<B, 3> {
        let state = self.initial_state(memory, question, true);
        let mut source = TeacherForcing::new(targets, start_token);
        self.unroll(embedding, state, &mut source).logits
    }

    /// Greedy token ids `[B, T]` with `T <= max_steps`.
    pub fn forward_greedy(
        &self,
        embedding:   &SharedEmbedding<B>,
        memory:      Tensor<B, 2>,
        question:    Tensor<B, 2>,
        start_token: usize,
        end_token:   usize,
        max_steps:   usize,
    ) -> Tensor<B, 2, Int> {
        let state = self.initial_state(memory, question, false);
        let mut source = Greedy::new(start_token, end_token, max_steps);
        self.unroll(embedding, state, &mut source).sample_ids
    }
}

/// Prepend `<start>` and drop the last column: `[B, T]` → `[B, T]`.
pub fn shift_right<B: Backend>(targets: Tensor<B, 2, Int>, start_token: usize) -> Tensor<B, 2, Int> {
    let [batch, steps] = targets.dims();
    let start = Tensor::full([batch, 1], start_token as i64, &targets.device());
    if steps <= 1 {
        return start;
    }
    Tensor::cat(vec![start, targets.slice([0..batch, 0..steps - 1])], 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn ints(t: Tensor<TestBackend, 2, Int>) -> Vec<i64> {
        t.into_data().convert::<i64>().to_vec().unwrap()
    }

    #[test]
    fn test_shift_right() {
        let device = Default::default();
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([5, 6, 7, 8, 9, 2], &device).reshape([2, 3]);
        assert_eq!(ints(shift_right(targets, 1)), vec![1, 5, 6, 1, 8, 9]);
    }

    #[test]
    fn test_greedy_stops_at_cap_without_end_token() {
        let device = Default::default();
        let emb = SharedEmbedding::<TestBackend>::new(10, 4, &device);
        let decoder = AnswerDecoder::<TestBackend>::new(4, 6, 10, 0.0, &device);
        let memory = Tensor::random([3, 6], Distribution::Default, &device);
        let question = Tensor::random([3, 6], Distribution::Default, &device);

        // an end id the output layer can never produce
        let ids = decoder.forward_greedy(&emb, memory, question, 1, 99, 5);
        assert_eq!(ids.dims(), [3, 5]);
    }

    #[test]
    fn test_greedy_stops_when_all_finished() {
        let device = Default::default();
        let emb = SharedEmbedding::<TestBackend>::new(10, 4, &device);
        let decoder = AnswerDecoder::<TestBackend>::new(4, 6, 10, 0.0, &device);
        let memory = Tensor::random([1, 6], Distribution::Default, &device);
        let question = Tensor::random([1, 6], Distribution::Default, &device);

        // whatever comes out first is declared the end token
        let first_step = decoder.forward_greedy(&emb, memory.clone(), question.clone(), 1, 99, 1);
        let first = ints(first_step)[0] as usize;

        let ids = decoder.forward_greedy(&emb, memory, question, 1, first, 8);
        assert_eq!(ids.dims(), [1, 1]);
    }

    #[test]
    fn test_teacher_forcing_logit_shape() {
        let device = Default::default();
        let emb = SharedEmbedding::<TestBackend>::new(10, 4, &device);
        let decoder = AnswerDecoder::<TestBackend>::new(4, 6, 10, 0.0, &device);
        let memory = Tensor::random([2, 6], Distribution::Default, &device);
        let question = Tensor::random([2, 6], Distribution::Default, &device);
        let targets = Tensor::<TestBackend, 2, Int>::zeros([2, 4], &device);

        let logits = decoder.forward_train(&emb, memory, question, targets, 1);
        assert_eq!(logits.dims(), [2, 4, 10]);
    }

    #[test]
    fn test_modes_agree_on_self_generated_sequence() {
        let device = Default::default();
        let emb = SharedEmbedding::<TestBackend>::new(10, 4, &device);
        let decoder = AnswerDecoder::<TestBackend>::new(4, 6, 10, 0.0, &device);
        let memory = Tensor::random([2, 6], Distribution::Default, &device);
        let question = Tensor::random([2, 6], Distribution::Default, &device);

        let greedy = decoder.forward_greedy(&emb, memory.clone(), question.clone(), 1, 99, 6);
        let forced = decoder
            .forward_train(&emb, memory, question, greedy.clone(), 1)
            .argmax(2)
            .reshape([2, 6]);
        assert_eq!(ints(forced), ints(greedy));
    }
}
