//! Agent error types and output decoding

use serde_json::Value;
use thiserror::Error;

/// Error types for task executor operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid result: {0}")]
    InvalidResult(String),

    #[error("No JSON object or array found in agent output")]
    NoJson,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Short machine-readable name, used in failure details
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Api(_) => "api",
            AgentError::Timeout(_) => "timeout",
            AgentError::Io(_) => "io",
            AgentError::InvalidResult(_) => "invalid_result",
            AgentError::NoJson => "no_json",
            AgentError::Internal(_) => "internal",
        }
    }
}

/// Decode raw agent output bytes, honouring UTF-16 and UTF-8 byte order marks
pub fn decode_output(raw: &[u8]) -> String {
    match raw {
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        _ => String::from_utf8_lossy(raw).into_owned(),
    }
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> String {
    let units = bytes.chunks_exact(2).map(|pair| to_unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Find the first JSON object or array embedded in free-form text
///
/// Scans every `{` / `[` from the left and returns the first position that
/// starts a complete JSON value; surrounding prose is ignored.
pub fn extract_first_json(text: &str) -> Option<Value> {
    text.char_indices()
        .filter(|(_, c)| matches!(c, '{' | '['))
        .find_map(|(start, _)| {
            serde_json::Deserializer::from_str(&text[start..])
                .into_iter::<Value>()
                .next()
                .and_then(Result::ok)
        })
}

/// Decode agent output and extract its JSON payload
pub fn parse_agent_output(raw: &[u8]) -> Result<Value, AgentError> {
    extract_first_json(&decode_output(raw)).ok_or(AgentError::NoJson)
}
