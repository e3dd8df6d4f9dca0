//! Cross-crate scenario tests for the engine; see `tests/`.
