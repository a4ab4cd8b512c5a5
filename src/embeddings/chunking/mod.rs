
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_WINDOW_CHARS: usize = 1000;

/// How extracted text is cut into embedding units.
///
/// Neither policy respects sentence or paragraph boundaries, and the two do
/// not produce comparable chunk boundaries for the same document. The policy
/// name is stored on every embedding record so mixed namespaces can be told
/// apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkingStrategy {
    /// One chunk per non-blank line.
    #[default]
    Lines,
    /// Consecutive windows of `window_chars` characters.
    FixedWidth,
}

impl ChunkingStrategy {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lines => "lines",
            Self::FixedWidth => "fixed-width",
        }
    }
}

impl std::fmt::Display for ChunkingStrategy {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for content chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub strategy: ChunkingStrategy,
    /// Window size for the fixed-width policy, in characters (Unicode scalar values)
    pub window_chars: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            strategy: ChunkingStrategy::default(),
            window_chars: DEFAULT_WINDOW_CHARS,
        }
    }
}

/// A zero-indexed text segment of one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub content: String,
}

/// Chunk extracted text with the configured policy.
///
/// Empty input yields an empty sequence.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    let pieces = match config.strategy {
        ChunkingStrategy::Lines => split_lines(text),
        ChunkingStrategy::FixedWidth => split_fixed_width(text, config.window_chars),
    };

    debug!(
        "Chunked {} characters into {} chunks ({})",
        text.len(),
        pieces.len(),
        config.strategy
    );

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, content)| TextChunk { index, content })
        .collect()
}

/// Split on newlines, dropping lines that are blank after trimming.
///
/// Kept lines are returned verbatim, short lines are never merged.
#[inline]
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Slice into windows of `window` characters; the last one may be shorter.
///
/// Windows are not trimmed, so a window of pure whitespace is kept.
#[inline]
pub fn split_fixed_width(text: &str, window: usize) -> Vec<String> {
    let window = window.max(1);
    let mut chunks = Vec::with_capacity(text.len() / window + 1);
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == window {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
