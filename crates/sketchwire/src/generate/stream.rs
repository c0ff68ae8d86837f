//! Newline-delimited JSON records from the generation backend.

use serde::Deserialize;
use sketchwire_core::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRecord {
    /// The backend reported a failure.
    Failure(String),
    /// A full replacement of the generated code so far.
    Update { code: Option<String>, done: bool },
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    done: bool,
}

impl StreamRecord {
    pub fn parse(line: &str) -> Result<Self> {
        let raw: RawRecord = serde_json::from_str(line).map_err(|err| Error::decode(err.to_string()))?;
        match raw.error {
            Some(serde_json::Value::Null) | None => Ok(Self::Update {
                code: raw.code,
                done: raw.done,
            }),
            Some(serde_json::Value::String(message)) => Ok(Self::Failure(message)),
            Some(other) => Ok(Self::Failure(other.to_string())),
        }
    }
}

/// Splits a byte stream into lines, carrying partial lines (and partial UTF-8 sequences)
/// across chunk boundaries. Blank lines are skipped.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(line) = Self::text(&line[..pos]) {
                lines.push(line);
            }
        }
        lines
    }

    /// The unterminated trailing line, if any.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        Self::text(&rest)
    }

    fn text(bytes: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(bytes);
        let line = line.trim();
        (!line.is_empty()).then(|| line.to_string())
    }
}
