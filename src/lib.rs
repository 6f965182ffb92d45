//! Dynamic Memory Network question answering on Burn.
//!
//! Layers:
//!   config: hyperparameters and their validation
//!   error: library error types
//!   data: the batch contract and the Burn batcher that builds it
//!   ml: the network, one-step trainer and greedy inferencer

pub mod config;
pub mod data;
pub mod error;
pub mod ml;

pub use config::{DmnConfig, LossWeighting, PAD_TOKEN};
pub use data::batcher::{AnswerTargets, DmnBatch, DmnBatcher};
pub use data::dataset::DmnSample;
pub use error::{ConfigError, DmnError};
pub use ml::inferencer::Inferencer;
pub use ml::model::{Dmn, DmnOutput, Mode};
pub use ml::trainer::{adam_trainer, DmnTrainer, StepReport};
