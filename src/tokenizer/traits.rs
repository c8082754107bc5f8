//! Tokenizer trait definition.

use crate::error::Result;

/// Token ID type
pub type TokenId = u32;

/// Text → token-id encoder consumed by the Data Shard Provider.
///
/// Vocabulary and algorithm are the implementor's business; the training
/// pipeline only relies on `encode` and `vocab_size`.
pub trait Tokenizer: Send + Sync {
    /// Encode text to token IDs
    fn encode(&self, text: &str) -> Result<Vec<TokenId>>;

    /// Decode token IDs to text
    fn decode(&self, ids: &[TokenId]) -> Result<String>;

    /// Get vocabulary size; every id returned by `encode` is below it
    fn vocab_size(&self) -> usize;
}
