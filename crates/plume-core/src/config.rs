//! Evaluator resource limits

use serde::{Deserialize, Serialize};

/// Bounds an evaluator enforces while running scripts
///
/// Exceeding a depth limit raises a `stack overflow` runtime error; growing a
/// list or string past `max_collection_len` fails the write. Limits can be
/// loaded from TOML; missing keys keep their defaults:
///
/// ```toml
/// max_frames = 128
/// max_stack = 4096
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum call depth
    pub max_frames: usize,
    /// Maximum operand stack height
    pub max_stack: usize,
    /// Maximum number of live local slots across all frames
    pub max_locals: usize,
    /// Longest list an index write may pad out to, and longest repeated string
    pub max_collection_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frames: 256,
            max_stack: 64 * 1024,
            max_locals: 64 * 1024,
            max_collection_len: 1 << 20,
        }
    }
}

impl Limits {
    /// Parse limits from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let limits = Limits::from_toml_str("max_frames = 8").unwrap();
        assert_eq!(limits.max_frames, 8);
        assert_eq!(limits.max_stack, Limits::default().max_stack);
        assert_eq!(limits.max_collection_len, 1 << 20);
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(Limits::from_toml_str("max_frames = \"many\"").is_err());
    }
}
