use serde::{Deserialize, Serialize};

/// One tokenised, un-padded example.
///
/// `sentences` are the facts in story order; `answer` already ends
/// with the end token when the caller wants the model to learn where
/// to stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DmnSample {
    pub sentences: Vec<Vec<u32>>,
    pub question:  Vec<u32>,
    pub answer:    Option<Vec<u32>>,
}

impl DmnSample {
    pub fn new(sentences: Vec<Vec<u32>>, question: Vec<u32>, answer: Vec<u32>) -> Self {
        Self { sentences, question, answer: Some(answer) }
    }

    /// A question to be answered, with no target.
    pub fn unlabelled(sentences: Vec<Vec<u32>>, question: Vec<u32>) -> Self {
        Self { sentences, question, answer: None }
    }

    pub fn fact_count(&self) -> usize {
        self.sentences.len()
    }
}
