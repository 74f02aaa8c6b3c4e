//! Model capability catalog
//!
//! Pure data: context-window sizes for known model families, consulted by
//! history compaction to decide when a conversation no longer fits. Matching
//! is by prefix so versioned identifiers ("gpt-4o-2024-08-06") resolve
//! without an exhaustive table. Unknown models get a conservative default.
//!
//! No global state; the catalog is a function of its input.

/// Context window assumed for models not in the catalog.
pub const DEFAULT_CONTEXT_WINDOW: usize = 128_000;

/// Known model-family context windows, longest prefix first.
const CONTEXT_WINDOWS: &[(&str, usize)] = &[
    ("gpt-4o-mini", 128_000),
    ("gpt-4o", 128_000),
    ("gpt-4.1", 1_000_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4", 8_192),
    ("gpt-3.5-turbo", 16_385),
    ("o1-mini", 128_000),
    ("o1", 200_000),
    ("o3", 200_000),
    ("claude-3-5", 200_000),
    ("claude-3", 200_000),
    ("claude", 200_000),
    ("gemini-1.5-pro", 2_000_000),
    ("gemini", 1_000_000),
    ("deepseek", 64_000),
    ("llama-3", 128_000),
    ("llama", 8_192),
    ("mistral", 32_000),
];

/// Context window for a model identifier.
pub fn context_window(model: &str) -> usize {
    let lower = model.to_lowercase();
    CONTEXT_WINDOWS
        .iter()
        .find(|(prefix, _)| lower.starts_with(prefix))
        .map(|(_, window)| *window)
        .unwrap_or(DEFAULT_CONTEXT_WINDOW)
}
