//! Cross-module scenario tests with in-crate fakes.
