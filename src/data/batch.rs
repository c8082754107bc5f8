//! Batch data structure

use crate::tokenizer::TokenId;

/// A batch of token-id sequences
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    /// One token sequence per record
    pub sequences: Vec<Vec<TokenId>>,
}

impl Batch {
    /// Create a new batch
    pub fn new(sequences: Vec<Vec<TokenId>>) -> Self {
        Self { sequences }
    }

    /// Number of sequences
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// Whether the batch holds no sequences
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Total number of tokens
    pub fn num_tokens(&self) -> usize {
        self.sequences.iter().map(Vec::len).sum()
    }

    /// Adjacent (input, target) token pairs used for next-token prediction
    pub fn pairs(&self) -> impl Iterator<Item = (TokenId, TokenId)> + '_ {
        self.sequences.iter().flat_map(|seq| seq.windows(2).map(|w| (w[0], w[1])))
    }

    /// Number of next-token targets in the batch
    pub fn num_targets(&self) -> usize {
        self.sequences.iter().map(|s| s.len().saturating_sub(1)).sum()
    }
}
