// ============================================================
// Dynamic Memory Network
// ============================================================
// Build phase: `DmnConfig::init` constructs every learnable block
// exactly once (embedding table, encoders, attention scorer,
// per-hop memory layers, decoder). The training path and the
// inference path are two `apply` methods on the same `Dmn`, so
// they read identical parameters by construction.
//
//   inputs ──► InputEncoder ──► facts ─┐
//                                      ├─► EpisodicMemory ──► memory ─┐
//   questions ─► QuestionEncoder ─► q ─┴──────────────────────────────┴─► AnswerDecoder
//                                                                          │
//                                      teacher-forced logits ◄─────────────┤
//                                      greedy token ids      ◄─────────────┘

use burn::{
    nn::loss::CrossEntropyLossConfig,
    prelude::*,
    tensor::activation::log_softmax,
};

use crate::config::{DmnConfig, LossWeighting};
use crate::data::batcher::DmnBatch;
use crate::error::{DmnError, Result};
use crate::ml::decoder::AnswerDecoder;
use crate::ml::embedding::SharedEmbedding;
use crate::ml::encoder::{InputEncoder, QuestionEncoder};
use crate::ml::gru::padding_mask;
use crate::ml::memory::{EpisodicMemory, MemoryTrace};

impl DmnConfig {
    /// Validate the hyperparameters, then build the model on `device`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Dmn<B>> {
        self.validate()?;

        let model = Dmn {
            embedding:        SharedEmbedding::new(self.vocab_size, self.embed_dim, device),
            input_encoder:    InputEncoder::new(self.embed_dim, self.hidden_size, self.dropout, device),
            question_encoder: QuestionEncoder::new(self.embed_dim, self.hidden_size, device),
            memory:           EpisodicMemory::new(self.hidden_size, self.embed_dim, self.n_hops, device),
            decoder:          AnswerDecoder::new(
                self.embed_dim, self.hidden_size, self.vocab_size, self.dropout, device,
            ),
            vocab_size:       self.vocab_size,
            max_sent_len:     self.max_sent_len,
            max_answer_len:   self.max_answer_len,
            start_token:      self.start_token,
            end_token:        self.end_token,
        };
        tracing::info!(
            "DMN ready: {} params, {} hops, hidden={}, embed={}",
            model.num_params(), self.n_hops, self.hidden_size, self.embed_dim,
        );
        Ok(model)
    }
}

#[derive(Module, Debug)]
pub struct Dmn<B: Backend> {
    pub embedding:        SharedEmbedding<B>,
    pub input_encoder:    InputEncoder<B>,
    pub question_encoder: QuestionEncoder<B>,
    pub memory:           EpisodicMemory<B>,
    pub decoder:          AnswerDecoder<B>,
    pub vocab_size:       usize,
    pub max_sent_len:     usize,
    pub max_answer_len:   usize,
    pub start_token:      usize,
    pub end_token:        usize,
}

/// Which output the caller wants from `Dmn::run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Predict,
}

pub enum DmnOutput<B: Backend> {
    /// Scalar loss `[1]` and the teacher-forced logits `[B, T, vocab]`.
    Train { loss: Tensor<B, 1>, logits: Tensor<B, 3> },
    /// Greedy token ids `[B, <= max_answer_len]`.
    Predict { ids: Tensor<B, 2, Int> },
}

/// Intermediate tensors shared by both decoding paths.
#[derive(Debug, Clone)]
pub struct Encoded<B: Backend> {
    pub facts:    Tensor<B, 3>,
    pub question: Tensor<B, 2>,
    pub trace:    MemoryTrace<B>,
}

impl<B: Backend> Dmn<B> {
    /// Run both encoders and every memory hop.
    pub fn encode(&self, batch: &DmnBatch<B>, training: bool) -> Result<Encoded<B>> {
        batch.check_widths(self.max_sent_len, self.max_answer_len)?;

        let facts = self.input_encoder.forward(
            &self.embedding,
            batch.inputs.clone(),
            batch.inputs_len.clone(),
            training,
        );
        let question = self.question_encoder.forward(
            &self.embedding,
            batch.questions.clone(),
            batch.questions_len.clone(),
        );
        let trace = self.memory.forward(facts.clone(), question.clone(), batch.inputs_len.clone());

        Ok(Encoded { facts, question, trace })
    }

    /// Teacher-forced logits `[B, max_answer_len, vocab]`.
    pub fn forward_train(&self, batch: &DmnBatch<B>) -> Result<Tensor<B, 3>> {
        let answers = batch.answers.as_ref().ok_or(DmnError::MissingAnswers)?;
        let encoded = self.encode(batch, true)?;
        Ok(self.decoder.forward_train(
            &self.embedding,
            encoded.trace.final_memory(),
            encoded.question,
            answers.ids.clone(),
            self.start_token,
        ))
    }

    /// Greedy answer ids `[B, <= max_answer_len]`.
    pub fn forward_predict(&self, batch: &DmnBatch<B>) -> Result<Tensor<B, 2, Int>> {
        let encoded = self.encode(batch, false)?;
        Ok(self.decoder.forward_greedy(
            &self.embedding,
            encoded.trace.final_memory(),
            encoded.question,
            self.start_token,
            self.end_token,
            self.max_answer_len,
        ))
    }

    /// Mean token-level cross-entropy of the teacher-forced path.
    pub fn forward_loss(
        &self,
        batch:     &DmnBatch<B>,
        weighting: LossWeighting,
    ) -> Result<(Tensor<B, 1>, Tensor<B, 3>)> {
        let answers = batch.answers.as_ref().ok_or(DmnError::MissingAnswers)?;
        let logits = self.forward_train(batch)?;
        let loss = sequence_loss(logits.clone(), answers.ids.clone(), answers.lengths.clone(), weighting);
        Ok((loss, logits))
    }

    /// Dispatch on `mode`; both paths share every parameter.
    pub fn run(&self, batch: &DmnBatch<B>, mode: Mode, weighting: LossWeighting) -> Result<DmnOutput<B>> {
        match mode {
            Mode::Train => {
                let (loss, logits) = self.forward_loss(batch, weighting)?;
                Ok(DmnOutput::Train { loss, logits })
            }
            Mode::Predict => Ok(DmnOutput::Predict { ids: self.forward_predict(batch)? }),
        }
    }
}

/// Cross-entropy averaged over target positions.
///
/// `Uniform` weights every position of the padded answer, padding
/// included. `ValidTokens` only counts positions inside `lengths`.
pub fn sequence_loss<B: Backend>(
    logits:    Tensor<B, 3>,
    targets:   Tensor<B, 2, Int>,
    lengths:   Tensor<B, 1, Int>,
    weighting: LossWeighting,
) -> Tensor<B, 1> {
    let [batch, steps, vocab] = logits.dims();
    let flat_logits = logits.reshape([batch * steps, vocab]);
    let flat_targets = targets.reshape([batch * steps]);

    match weighting {
        LossWeighting::Uniform => CrossEntropyLossConfig::new()
            .init(&flat_logits.device())
            .forward(flat_logits, flat_targets),
        LossWeighting::ValidTokens => {
            let weights = padding_mask(lengths, steps).bool_not().float().reshape([batch * steps]);
            let picked = log_softmax(flat_logits, 1)
                .gather(1, flat_targets.reshape([batch * steps, 1]))
                .reshape([batch * steps]);
            // guard against an all-empty batch
            let count = weights.clone().sum().clamp_min(1.0);
            (picked * weights).sum().neg() / count
        }
    }
}
