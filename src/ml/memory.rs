// ============================================================
// Episodic Memory Module
// ============================================================
// memory_0 = q
// for hop i in 0..H:
//
//   1. Gating attention (shared weights, every hop, every fact)
//        z   = [f ⊙ q, f ⊙ m_i, |f - q|, |f - m_i|]        [B, N, 4H]
//        g   = softmax_N( W2 tanh(W1 z + b1) + b2 )       [B, N]
//      Facts past each item's valid count are masked out
//      before the softmax.
//
//   2. Episode: attention GRU over [f ‖ g]                 [B, H]
//
//   3. Memory update (weights owned by hop i only)
//        m_{i+1} = relu(W_i [m_i ‖ e_i ‖ q] + b_i)          [B, H]
//
// All facts are scored in one batched pass per hop.
//
// Reference: Xiong et al. (2016) DMN+ §3.3, Kumar et al. (2016) §2.3

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::{relu, softmax, tanh},
};

use crate::ml::gru::{padding_mask, AttentionGruCell};

/// Logit given to padded facts; finite so an item with no valid
/// fact still gets a uniform (not NaN) distribution.
const MASKED_LOGIT: f32 = -1.0e9;

/// Two-layer scorer producing one attention logit per fact.
#[derive(Module, Debug)]
pub struct AttentionGate<B: Backend> {
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
}

impl<B: Backend> AttentionGate<B> {
    pub fn new(hidden_size: usize, embed_dim: usize, device: &B::Device) -> Self {
        Self {
            fc1: LinearConfig::new(4 * hidden_size, embed_dim).init(device),
            fc2: LinearConfig::new(embed_dim, 1).init(device),
        }
    }

    /// facts [B, N, H], question/memory [B, H], lengths [B] → gates [B, N]
    pub fn forward(
        &self,
        facts:    Tensor<B, 3>,
        question: Tensor<B, 2>,
        memory:   Tensor<B, 2>,
        lengths:  Tensor<B, 1, Int>,
    ) -> Tensor<B, 2> {
        let [batch, num_facts, hidden] = facts.dims();
        let q = question.unsqueeze_dim::<3>(1).expand([batch, num_facts, hidden]);
        let m = memory.unsqueeze_dim::<3>(1).expand([batch, num_facts, hidden]);

        let features = Tensor::cat(
            vec![
                facts.clone() * q.clone(),
                facts.clone() * m.clone(),
                (facts.clone() - q).abs(),
                (facts - m).abs(),
            ],
            2,
        );

        let logits = self
            .fc2
            .forward(tanh(self.fc1.forward(features)))
            .reshape([batch, num_facts])
            .mask_fill(padding_mask(lengths, num_facts), MASKED_LOGIT);
        softmax(logits, 1)
    }
}

/// Everything one hop produced.
#[derive(Debug, Clone)]
pub struct HopOutput<B: Backend> {
    pub gates:   Tensor<B, 2>,
    pub episode: Tensor<B, 2>,
    pub memory:  Tensor<B, 2>,
}

/// Memory after every hop; `memories[0]` is the question vector.
#[derive(Debug, Clone)]
pub struct MemoryTrace<B: Backend> {
    pub memories: Vec<Tensor<B, 2>>,
    pub gates:    Vec<Tensor<B, 2>>,
}

impl<B: Backend> MemoryTrace<B> {
    pub fn final_memory(&self) -> Tensor<B, 2> {
        // n_hops >= 1 is enforced by config validation
        self.memories[self.memories.len() - 1].clone()
    }
}

#[derive(Module, Debug)]
pub struct EpisodicMemory<B: Backend> {
    pub attention:     AttentionGate<B>,
    pub attention_gru: AttentionGruCell<B>,
    pub hops:          Vec<Linear<B>>,
}

impl<B: Backend> EpisodicMemory<B> {
    pub fn new(hidden_size: usize, embed_dim: usize, n_hops: usize, device: &B::Device) -> Self {
        let hops = (0..n_hops)
            .map(|_| LinearConfig::new(3 * hidden_size, hidden_size).init(device))
            .collect();
        Self {
            attention:     AttentionGate::new(hidden_size, embed_dim, device),
            attention_gru: AttentionGruCell::new(hidden_size, device),
            hops,
        }
    }

    pub fn n_hops(&self) -> usize {
        self.hops.len()
    }

    /// One hop: reads `memory` (m_i), returns gates, episode and m_{i+1}.
    pub fn hop(
        &self,
        index:    usize,
        facts:    Tensor<B, 3>,
        question: Tensor<B, 2>,
        memory:   Tensor<B, 2>,
        lengths:  Tensor<B, 1, Int>,
    ) -> HopOutput<B> {
        let [batch, num_facts, _] = facts.dims();

        let gates = self
            .attention
            .forward(facts.clone(), question.clone(), memory.clone(), lengths.clone());

        let gated = Tensor::cat(vec![facts, gates.clone().reshape([batch, num_facts, 1])], 2);
        let episode = self.attention_gru.unroll(gated, lengths);

        let next = relu(
            self.hops[index].forward(Tensor::cat(vec![memory, episode.clone(), question], 1)),
        );

        HopOutput { gates, episode, memory: next }
    }

    /// Run every hop starting from `memory_0 = question`.
    pub fn forward(
        &self,
        facts:    Tensor<B, 3>,
        question: Tensor<B, 2>,
        lengths:  Tensor<B, 1, Int>,
    ) -> MemoryTrace<B> {
        let mut memories = vec![question.clone()];
        let mut gates = Vec::with_capacity(self.n_hops());

        for index in 0..self.n_hops() {
            tracing::trace!("memory episode {}", index);
            let out = self.hop(
                index,
                facts.clone(),
                question.clone(),
                memories[index].clone(),
                lengths.clone(),
            );
            gates.push(out.gates);
            memories.push(out.memory);
        }

        MemoryTrace { memories, gates }
    }
}
