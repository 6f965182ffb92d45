// ============================================================
// Data: Batch Contract
// ============================================================
// Tokenisation and dataset loading happen upstream. This layer
// starts from already-tokenised samples and ends at the tensors
// the model reads:
//
//   DmnSample    → one story (sentences), question and answer ids
//       │
//       ▼
//   DmnBatcher   → pads and stacks samples (Burn Batcher trait)
//       │
//       ▼
//   DmnBatch     → shape-checked [B, ...] tensors + valid lengths

/// Un-padded tokenised samples
pub mod dataset;

/// Padded tensor batches and the Batcher that builds them
pub mod batcher;
