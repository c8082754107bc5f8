//! Byte-level tokenizer implementation.

use crate::error::{Error, Result};

use super::traits::{TokenId, Tokenizer};

/// Number of distinct byte tokens.
pub const BYTE_VOCAB_SIZE: usize = 256;

/// Byte-level tokenizer: every UTF-8 byte is one token.
///
/// Needs no training and never fails to encode, which makes it a convenient
/// default for the reference model.
#[derive(Debug, Clone, Default)]
pub struct ByteTokenizer {
    max_len: Option<usize>,
}

impl ByteTokenizer {
    /// Create a byte tokenizer without truncation
    pub fn new() -> Self {
        Self::default()
    }

    /// Truncate encoded sequences to at most `max_len` tokens
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }
}

impl Tokenizer for ByteTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
        let limit = self.max_len.unwrap_or(usize::MAX);
        Ok(text.bytes().take(limit).map(TokenId::from).collect())
    }

    fn decode(&self, ids: &[TokenId]) -> Result<String> {
        let bytes = ids
            .iter()
            .map(|&id| u8::try_from(id).map_err(|_| Error::Data(format!("Invalid token ID: {id}"))))
            .collect::<Result<Vec<u8>>>()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn vocab_size(&self) -> usize {
        BYTE_VOCAB_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let tok = ByteTokenizer::new();
        let ids = tok.encode("hi!").unwrap();
        assert_eq!(ids, vec![104, 105, 33]);
        assert_eq!(tok.decode(&ids).unwrap(), "hi!");
    }

    #[test]
    fn test_truncation() {
        let tok = ByteTokenizer::new().with_max_len(2);
        assert_eq!(tok.encode("hello").unwrap().len(), 2);
    }

    #[test]
    fn test_ids_below_vocab_size() {
        let tok = ByteTokenizer::new();
        let ids = tok.encode("naïve ☃").unwrap();
        assert!(ids.iter().all(|&id| (id as usize) < tok.vocab_size()));
    }

    #[test]
    fn test_decode_rejects_out_of_range() {
        let tok = ByteTokenizer::new();
        assert!(tok.decode(&[300]).is_err());
    }
}
