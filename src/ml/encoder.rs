// ============================================================
// Input and Question Encoders
// ============================================================
// Input encoder:
//   ids [B, N, S] → embed [B, N, S, E]
//                 → × position weights, sum over S → [B, N, E]
//                 → forward GRU (H/2) ‖ backward GRU (H/2) → [B, N, H]
//                 → dropout (training path only)
//
// Question encoder:
//   ids [B, Q] → embed [B, Q, E] → GRU (H) → last valid state [B, H]
//
// Both read through the shared embedding table they are handed;
// neither owns an embedding of its own.

use burn::{
    nn::{Dropout, DropoutConfig},
    prelude::*,
};

use crate::ml::embedding::SharedEmbedding;
use crate::ml::gru::GruCell;
use crate::ml::position::position_encoding_tensor;

#[derive(Module, Debug)]
pub struct InputEncoder<B: Backend> {
    pub forward_cell:  GruCell<B>,
    pub backward_cell: GruCell<B>,
    pub dropout:       Dropout,
}

impl<B: Backend> InputEncoder<B> {
    pub fn new(embed_dim: usize, hidden_size: usize, dropout: f64, device: &B::Device) -> Self {
        let half = hidden_size / 2;
        Self {
            forward_cell:  GruCell::new(embed_dim, half, device),
            backward_cell: GruCell::new(embed_dim, half, device),
            dropout:       DropoutConfig::new(dropout).init(),
        }
    }

    /// inputs: [B, N, S], inputs_len: [B] → fact vectors [B, N, H]
    pub fn forward(
        &self,
        embedding:  &SharedEmbedding<B>,
        inputs:     Tensor<B, 3, Int>,
        inputs_len: Tensor<B, 1, Int>,
        training:   bool,
    ) -> Tensor<B, 3> {
        let [batch, num_sentences, sentence_len] = inputs.dims();
        let embed_dim = embedding.embed_dim;

        let words: Tensor<B, 4> = embedding.lookup(inputs);
        let position = position_encoding_tensor::<B>(sentence_len, embed_dim, &words.device())
            .reshape([1, 1, sentence_len, embed_dim])
            .expand([batch, num_sentences, sentence_len, embed_dim]);
        let sentences = (words * position)
            .sum_dim(2)
            .reshape([batch, num_sentences, embed_dim]);

        let (forward_out, _) = self.forward_cell.unroll(sentences.clone(), inputs_len.clone(), false);
        let (backward_out, _) = self.backward_cell.unroll(sentences, inputs_len, true);
        let facts = Tensor::cat(vec![forward_out, backward_out], 2);

        if training { self.dropout.forward(facts) } else { facts }
    }
}

#[derive(Module, Debug)]
pub struct QuestionEncoder<B: Backend> {
    pub cell: GruCell<B>,
}

impl<B: Backend> QuestionEncoder<B> {
    pub fn new(embed_dim: usize, hidden_size: usize, device: &B::Device) -> Self {
        Self { cell: GruCell::new(embed_dim, hidden_size, device) }
    }

    /// questions: [B, Q], questions_len: [B] → question vector [B, H]
    pub fn forward(
        &self,
        embedding:     &SharedEmbedding<B>,
        questions:     Tensor<B, 2, Int>,
        questions_len: Tensor<B, 1, Int>,
    ) -> Tensor<B, 2> {
        let words: Tensor<B, 3> = embedding.lookup(questions);
        let (_, last) = self.cell.unroll(words, questions_len, false);
        last
    }
}
