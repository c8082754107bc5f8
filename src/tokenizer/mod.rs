//! Tokenization for the data pipeline
//!
//! The tokenizer is an external collaborator: the pipeline only needs
//! `encode(text) -> token ids`. [`ByteTokenizer`] is the built-in default.

mod byte;
mod traits;

pub use byte::{ByteTokenizer, BYTE_VOCAB_SIZE};
pub use traits::{TokenId, Tokenizer};
