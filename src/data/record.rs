//! Text records and JSON-lines loading.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};

/// One dataset record; only the text is consumed by training.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRecord {
    /// Raw text to tokenize
    pub text: String,
}

impl TextRecord {
    /// Create a record from text
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl AsRef<str> for TextRecord {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// Load records from a JSON-lines file, reading `text_field` of each object.
///
/// Blank lines are skipped. Order is preserved, which keeps shard
/// assignment reproducible across runs.
///
/// # Errors
///
/// [`Error::Io`] if the file cannot be read, [`Error::Data`] if a line is not
/// a JSON object with a string `text_field`.
pub fn load_jsonl(path: impl AsRef<Path>, text_field: &str) -> Result<Vec<TextRecord>> {
    let path = path.as_ref();
    let file =
        File::open(path).map_err(|e| Error::io(format!("opening {}", path.display()), e))?;

    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(parse_record(&line, text_field).map_err(|msg| {
            Error::Data(format!("{}:{}: {msg}", path.display(), line_no + 1))
        })?);
    }
    Ok(records)
}

fn parse_record(line: &str, text_field: &str) -> std::result::Result<TextRecord, String> {
    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| format!("invalid JSON: {e}"))?;
    match value.get(text_field) {
        Some(serde_json::Value::String(text)) => Ok(TextRecord::new(text.clone())),
        Some(_) => Err(format!("field '{text_field}' is not a string")),
        None => Err(format!("missing field '{text_field}'")),
    }
}
