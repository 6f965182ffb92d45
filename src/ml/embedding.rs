// ============================================================
// Shared Embedding Table
// ============================================================
// One trainable [vocab_size, embed_dim] table used by the input
// encoder, the question encoder and the answer decoder. The model
// owns a single instance and hands out `&SharedEmbedding`, so the
// three consumers read the very same parameter.
//
// Row 0 is the padding id. Its stored value can drift during
// training, so every lookup goes through `table()`, which swaps
// that row for zeros before indexing.

use burn::{
    nn::{Embedding, EmbeddingConfig},
    prelude::*,
};

#[derive(Module, Debug)]
pub struct SharedEmbedding<B: Backend> {
    pub embedding: Embedding<B>,
    pub embed_dim: usize,
}

impl<B: Backend> SharedEmbedding<B> {
    pub fn new(vocab_size: usize, embed_dim: usize, device: &B::Device) -> Self {
        let embedding = EmbeddingConfig::new(vocab_size, embed_dim).init(device);
        Self { embedding, embed_dim }
    }

    /// The lookup table with the padding row forced to zero.
    pub fn table(&self) -> Tensor<B, 2> {
        let weight = self.embedding.weight.val();
        let [vocab_size, embed_dim] = weight.dims();
        let pad_row = Tensor::zeros([1, embed_dim], &weight.device());
        Tensor::cat(vec![pad_row, weight.slice([1..vocab_size, 0..embed_dim])], 0)
    }

    /// Embed ids of any rank; the result appends an `embed_dim` axis.
    ///
    /// # Panics
    ///
    /// If `D2 != D + 1`. Burn checks tensor ranks at runtime the same way.
    pub fn lookup<const D: usize, const D2: usize>(&self, ids: Tensor<B, D, Int>) -> Tensor<B, D2> {
        assert_eq!(D + 1, D2, "lookup output rank must be input rank + 1");
        let dims = ids.dims();
        let count: usize = dims.iter().product();

        let mut shape = [0usize; D2];
        shape[..D].copy_from_slice(&dims);
        shape[D] = self.embed_dim;

        self.table()
            .select(0, ids.reshape([count]))
            .reshape(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_padding_row_is_zero() {
        let device = Default::default();
        let emb = SharedEmbedding::<TestBackend>::new(10, 4, &device);

        let row0: Vec<f32> = emb.table().slice([0..1, 0..4]).into_data().to_vec().unwrap();
        assert_eq!(row0, vec![0.0; 4]);

        // the raw parameter is random; only the view is masked
        let raw: Vec<f32> = emb.embedding.weight.val().slice([0..1, 0..4]).into_data().to_vec().unwrap();
        assert!(raw.iter().any(|&x| x != 0.0));
    }

    #[test]
    fn test_lookup_shape_and_padding() {
        let device = Default::default();
        let emb = SharedEmbedding::<TestBackend>::new(10, 4, &device);
        let ids = Tensor::<TestBackend, 1, Int>::from_ints([0, 3, 0, 7, 1, 0], &device)
            .reshape([1, 2, 3]);

        let out: Tensor<TestBackend, 4> = emb.lookup(ids);
        assert_eq!(out.dims(), [1, 2, 3, 4]);

        let first: Vec<f32> = out.clone().slice([0..1, 0..1, 0..1, 0..4]).into_data().to_vec().unwrap();
        assert_eq!(first, vec![0.0; 4]);

        let expected: Vec<f32> = emb.table().slice([3..4, 0..4]).into_data().to_vec().unwrap();
        let second: Vec<f32> = out.slice([0..1, 0..1, 1..2, 0..4]).into_data().to_vec().unwrap();
        assert_eq!(second, expected);
    }

    #[test]
    #[should_panic(expected = "lookup output rank")]
    fn test_lookup_rejects_wrong_output_rank() {
        let device = Default::default();
        let emb = SharedEmbedding::<TestBackend>::new(10, 4, &device);
        let ids = Tensor::<TestBackend, 2, Int>::zeros([1, 2], &device);
        let _: Tensor<TestBackend, 2> = emb.lookup(ids);
    }
}
