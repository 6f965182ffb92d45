// ============================================================
// Recurrent Cells
// ============================================================
// Two cells, both unrolled step by step so that per-item valid
// lengths can be honoured:
//
//   GruCell: standard GRU
//       r  = σ(W_r x + U_r h + b_r)
//       z  = σ(W_z x + U_z h + b_z)
//       h~ = tanh(W_h x + U_h (r ⊙ h) + b_h)
//       h' = z ⊙ h + (1 - z) ⊙ h~
//
//   AttentionGruCell: the update gate z is replaced by an
//   externally supplied attention gate g
//       h' = g ⊙ h~ + (1 - g) ⊙ h
//
// Masking: at step t an item whose length is <= t keeps its
// previous state and emits a zero output, so padding never
// reaches the state.
//
// Every recurrent projection U starts as a random orthogonal
// matrix; input projections keep Burn's default initialiser.
//
// Reference: Cho et al. (2014), Xiong et al. (2016) DMN+ §3.3

use burn::{
    module::Param,
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::{
        activation::{sigmoid, tanh},
        TensorData,
    },
};
use rand::Rng;

/// Input and recurrent projections for one gate.
#[derive(Module, Debug)]
pub struct Gate<B: Backend> {
    pub input:  Linear<B>,
    pub hidden: Linear<B>,
}

impl<B: Backend> Gate<B> {
    fn new(d_input: usize, d_hidden: usize, device: &B::Device) -> Self {
        let mut hidden: Linear<B> = LinearConfig::new(d_hidden, d_hidden).with_bias(false).init(device);
        hidden.weight = Param::from_tensor(orthogonal(d_hidden, device));
        Self {
            input: LinearConfig::new(d_input, d_hidden).init(device),
            hidden,
        }
    }

    fn forward(&self, x: Tensor<B, 2>, h: Tensor<B, 2>) -> Tensor<B, 2> {
        self.input.forward(x) + self.hidden.forward(h)
    }
}

#[derive(Module, Debug)]
pub struct GruCell<B: Backend> {
    pub reset:     Gate<B>,
    pub update:    Gate<B>,
    pub candidate: Gate<B>,
    pub d_hidden:  usize,
}

impl<B: Backend> GruCell<B> {
    pub fn new(d_input: usize, d_hidden: usize, device: &B::Device) -> Self {
        Self {
            reset:     Gate::new(d_input, d_hidden, device),
            update:    Gate::new(d_input, d_hidden, device),
            candidate: Gate::new(d_input, d_hidden, device),
            d_hidden,
        }
    }

    /// One step: x [B, in], h [B, hidden] → h' [B, hidden]
    pub fn forward(&self, x: Tensor<B, 2>, h: Tensor<B, 2>) -> Tensor<B, 2> {
        let r = sigmoid(self.reset.forward(x.clone(), h.clone()));
        let z = sigmoid(self.update.forward(x.clone(), h.clone()));
        let candidate = tanh(self.candidate.forward(x, r * h.clone()));
        z.clone() * h + (z.neg() + 1.0) * candidate
    }

    /// Run over a `[B, T, in]` sequence from a zero state.
    ///
    /// Returns every step's output `[B, T, hidden]` (zeros past each
    /// item's length) and the last valid state `[B, hidden]`.
    /// With `reverse`, each item's valid prefix is read back to front.
    pub fn unroll(
        &self,
        inputs:  Tensor<B, 3>,
        lengths: Tensor<B, 1, Int>,
        reverse: bool,
    ) -> (Tensor<B, 3>, Tensor<B, 2>) {
        let [batch, steps, d_input] = inputs.dims();
        let device = inputs.device();
        let mut state = Tensor::zeros([batch, self.d_hidden], &device);
        let mut outputs = Vec::with_capacity(steps);

        let order: Vec<usize> = if reverse { (0..steps).rev().collect() } else { (0..steps).collect() };
        for t in order {
            let x = inputs.clone().slice([0..batch, t..t + 1, 0..d_input]).reshape([batch, d_input]);
            let mask = step_mask(lengths.clone(), t, self.d_hidden);
            let next = self.forward(x, state.clone());
            state = masked_update(mask.clone(), next, state);
            outputs.push(state.clone() * mask);
        }

        if reverse {
            outputs.reverse();
        }
        (Tensor::stack(outputs, 1), state)
    }
}

#[derive(Module, Debug)]
pub struct AttentionGruCell<B: Backend> {
    pub reset:     Gate<B>,
    pub candidate: Gate<B>,
    pub d_hidden:  usize,
}

impl<B: Backend> AttentionGruCell<B> {
    pub fn new(d_hidden: usize, device: &B::Device) -> Self {
        Self {
            reset:     Gate::new(d_hidden, d_hidden, device),
            candidate: Gate::new(d_hidden, d_hidden, device),
            d_hidden,
        }
    }

    /// One step on a gated fact: `fact_and_gate` is `[B, hidden + 1]`,
    /// the fact vector with its scalar attention gate appended.
    pub fn forward(&self, fact_and_gate: Tensor<B, 2>, h: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, width] = fact_and_gate.dims();
        assert_eq!(width, self.d_hidden + 1, "attention GRU expects [fact, gate] input");

        let fact = fact_and_gate.clone().slice([0..batch, 0..self.d_hidden]);
        let gate = fact_and_gate
            .slice([0..batch, self.d_hidden..width])
            .expand([batch, self.d_hidden]);

        let r = sigmoid(self.reset.forward(fact.clone(), h.clone()));
        let candidate = tanh(self.candidate.forward(fact, r * h.clone()));
        gate.clone() * candidate + (gate.neg() + 1.0) * h
    }

    /// Final state after reading `[B, T, hidden + 1]` gated facts.
    pub fn unroll(&self, gated_facts: Tensor<B, 3>, lengths: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        let [batch, steps, width] = gated_facts.dims();
        let mut state = Tensor::zeros([batch, self.d_hidden], &gated_facts.device());
        for t in 0..steps {
            let x = gated_facts.clone().slice([0..batch, t..t + 1, 0..width]).reshape([batch, width]);
            let mask = step_mask(lengths.clone(), t, self.d_hidden);
            let next = self.forward(x, state.clone());
            state = masked_update(mask, next, state);
        }
        state
    }
}

/// `[B, width]` of ones where `t < length`, zeros elsewhere.
pub fn step_mask<B: Backend>(lengths: Tensor<B, 1, Int>, t: usize, width: usize) -> Tensor<B, 2> {
    let [batch] = lengths.dims();
    lengths
        .greater_elem(t as i64)
        .float()
        .reshape([batch, 1])
        .expand([batch, width])
}

/// `[B, T]` boolean mask, true for positions at or past each length.
pub fn padding_mask<B: Backend>(lengths: Tensor<B, 1, Int>, steps: usize) -> Tensor<B, 2, Bool> {
    let [batch] = lengths.dims();
    let positions = Tensor::<B, 1, Int>::arange(0..steps as i64, &lengths.device())
        .reshape([1, steps])
        .expand([batch, steps]);
    positions.greater_equal(lengths.reshape([batch, 1]).expand([batch, steps]))
}

/// Random `[size, size]` matrix with orthonormal rows (Gram-Schmidt).
pub fn orthogonal<B: Backend>(size: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut rng = rand::thread_rng();
    let mut rows: Vec<Vec<f32>> = Vec::with_capacity(size);

    while rows.len() < size {
        let mut v: Vec<f32> = (0..size).map(|_| rng.gen_range(-1.0..1.0)).collect();
        for q in &rows {
            let dot: f32 = v.iter().zip(q).map(|(a, b)| a * b).sum();
            v.iter_mut().zip(q).for_each(|(a, b)| *a -= dot * b);
        }
        let norm = v.iter().map(|a| a * a).sum::<f32>().sqrt();
        // near-dependent draw, try again
        if norm < 1e-3 {
            continue;
        }
        v.iter_mut().for_each(|a| *a /= norm);
        rows.push(v);
    }

    Tensor::from_data(TensorData::new(rows.concat(), [size, size]), device)
}

fn masked_update<B: Backend>(mask: Tensor<B, 2>, next: Tensor<B, 2>, prev: Tensor<B, 2>) -> Tensor<B, 2> {
    mask.clone() * next + (mask.neg() + 1.0) * prev
}
