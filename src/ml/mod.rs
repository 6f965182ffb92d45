// ============================================================
// ML: Dynamic Memory Network (Burn)
// ============================================================
// All Burn modules live here, leaves first:
//
//   position.rs   fixed position weights for bag-of-words sentences
//   embedding.rs  the one embedding table every component shares
//   gru.rs        GRU and attention-GRU cells with length masking
//   encoder.rs    bidirectional fact encoder, question encoder
//   memory.rs     gated attention + episodic memory hops
//   decoder.rs    answer decoder, teacher-forced or greedy
//   model.rs      the assembled network, loss, train/predict paths
//   clip.rs       global-norm gradient clipping
//   trainer.rs    one forward/backward/clip/Adam step
//   inferencer.rs greedy answers from a trained model
//
// Reference: Kumar et al. (2016) Ask Me Anything: Dynamic Memory Networks
//            Xiong et al. (2016) Dynamic Memory Networks for Visual and Textual QA

pub mod position;
pub mod embedding;
pub mod gru;
pub mod encoder;
pub mod memory;
pub mod decoder;
pub mod model;
pub mod clip;
pub mod trainer;
pub mod inferencer;
