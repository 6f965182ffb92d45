// ============================================================
// Model Configuration
// ============================================================
// Every hyperparameter the network needs, in one struct that is
// passed by reference into each component at build time.
//
// Burn's Config derive gives us `new(required...)`, `with_*`
// builders for defaulted fields and JSON save/load for free, so
// the same struct a caller trains with can be written next to a
// checkpoint and read back for inference.
//
// `validate()` runs before any parameter is allocated.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Padding / unknown token id. Always embeds to the zero vector.
pub const PAD_TOKEN: usize = 0;

/// How target positions contribute to the sequence loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossWeighting {
    /// Every position of the padded answer counts, padding included.
    Uniform,
    /// Only positions inside each answer's true length count.
    ValidTokens,
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct DmnConfig {
    pub vocab_size:     usize,
    pub max_sent_len:   usize,
    pub max_answer_len: usize,
    pub start_token:    usize,
    pub end_token:      usize,
    #[config(default = 80)]
    pub embed_dim:      usize,
    #[config(default = 80)]
    pub hidden_size:    usize,
    #[config(default = 2)]
    pub n_hops:         usize,
    #[config(default = 0.1)]
    pub dropout:        f64,
    #[config(default = 5.0)]
    pub clip_norm:      f64,
    #[config(default = 1e-3)]
    pub learning_rate:  f64,
    #[config(default = "LossWeighting::Uniform")]
    pub loss_weighting: LossWeighting,
}

impl DmnConfig {
    /// Reject hyperparameters the graph cannot be built from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vocab_size < 2 {
            return Err(ConfigError::invalid(
                "vocab_size",
                format!("need at least the padding id and one real token, got {}", self.vocab_size),
            ));
        }
        if self.embed_dim == 0 {
            return Err(ConfigError::invalid("embed_dim", "must be positive"));
        }
        if self.hidden_size == 0 || self.hidden_size % 2 != 0 {
            return Err(ConfigError::invalid(
                "hidden_size",
                format!("must be a positive even number (split across two directions), got {}", self.hidden_size),
            ));
        }
        if self.n_hops == 0 {
            return Err(ConfigError::invalid("n_hops", "at least one memory hop is required"));
        }
        if self.max_sent_len == 0 {
            return Err(ConfigError::invalid("max_sent_len", "must be positive"));
        }
        if self.max_answer_len == 0 {
            return Err(ConfigError::invalid("max_answer_len", "must be positive"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ConfigError::invalid(
                "dropout",
                format!("must lie in [0, 1), got {}", self.dropout),
            ));
        }
        if !self.clip_norm.is_finite() || self.clip_norm <= 0.0 {
            return Err(ConfigError::invalid(
                "clip_norm",
                format!("must be positive and finite, got {}", self.clip_norm),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ConfigError::invalid(
                "learning_rate",
                format!("must be positive and finite, got {}", self.learning_rate),
            ));
        }
        check_token("start_token", self.start_token, self.vocab_size)?;
        check_token("end_token", self.end_token, self.vocab_size)?;
        Ok(())
    }
}

fn check_token(field: &'static str, id: usize, vocab_size: usize) -> Result<(), ConfigError> {
    if id == PAD_TOKEN {
        return Err(ConfigError::invalid(field, "id 0 is reserved for padding"));
    }
    if id >= vocab_size {
        return Err(ConfigError::invalid(
            field,
            format!("id {id} is outside the vocabulary of size {vocab_size}"),
        ));
    }
    Ok(())
}
