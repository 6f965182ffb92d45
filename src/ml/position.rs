// ============================================================
// Position Encoding
// ============================================================
// Word embeddings inside a sentence are summed into one vector,
// and a plain sum forgets word order. Each embedding is first
// scaled element-wise by a fixed weight that depends on
// (position j, dimension i):
//
//   l[j][i] = 1 + 4 * (i - (E+1)/2) * (j - (S+1)/2) / (E * S)
//
// with i in 1..=E (embedding dim) and j in 1..=S (sentence len).
// Nothing here is learned, so the matrix only depends on (S, E).
//
// Reference: Sukhbaatar et al. (2015) End-To-End Memory Networks §4.1

use burn::prelude::*;

/// Row-major `[sentence_len, embed_dim]` position weights.
pub fn position_encoding(sentence_len: usize, embed_dim: usize) -> Vec<f32> {
    let s = sentence_len as f32;
    let e = embed_dim as f32;
    let mut weights = Vec::with_capacity(sentence_len * embed_dim);
    for j in 1..=sentence_len {
        for i in 1..=embed_dim {
            let value = (i as f32 - (e + 1.0) / 2.0) * (j as f32 - (s + 1.0) / 2.0);
            weights.push(1.0 + 4.0 * value / (e * s));
        }
    }
    weights
}

/// Position weights as a `[sentence_len, embed_dim]` tensor on `device`.
pub fn position_encoding_tensor<B: Backend>(
    sentence_len: usize,
    embed_dim:    usize,
    device:       &B::Device,
) -> Tensor<B, 2> {
    let data = TensorData::new(
        position_encoding(sentence_len, embed_dim),
        [sentence_len, embed_dim],
    );
    Tensor::from_data(data, device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_deterministic_across_calls() {
        assert_eq!(position_encoding(6, 8), position_encoding(6, 8));
    }

    #[test]
    fn test_position_is_leading_axis() {
        let w = position_encoding(3, 5);
        assert_eq!(w.len(), 15);
        // first word, first dim: (1-3)*(1-2) = 2 → 1 + 8/15
        assert!((w[0] - (1.0 + 8.0 / 15.0)).abs() < 1e-6);
        // middle word of an odd-length sentence carries weight 1 everywhere
        assert!(w[5..10].iter().all(|&x| (x - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_tensor_matches_vec() {
        let device = Default::default();
        let t = position_encoding_tensor::<NdArray>(4, 6, &device);
        assert_eq!(t.dims(), [4, 6]);
        let values = t.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, position_encoding(4, 6));
    }
}
