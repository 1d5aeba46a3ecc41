//! Cross-module tests: spec scenarios, determinism, and property tests.
