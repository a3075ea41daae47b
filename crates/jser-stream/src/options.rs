//! Limits applied to untrusted streams.

use serde::Deserialize;

/// Bounds on what a single stream may ask the decoder to allocate.
///
/// Loadable from TOML; missing keys take their defaults.
///
/// ```
/// use jser_stream::StreamOptions;
///
/// let options = StreamOptions::default();
/// assert_eq!(options.max_depth, 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    /// Longest accepted string, in encoded bytes.
    pub max_string_len: u64,
    /// Longest accepted array, in elements.
    pub max_array_len: usize,
    /// Longest accepted block-data record, in bytes.
    pub max_block_len: usize,
    /// Deepest accepted element nesting.
    pub max_depth: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            max_string_len: 16 << 20,
            max_array_len: 16 << 20,
            max_block_len: 16 << 20,
            max_depth: 1024,
        }
    }
}
