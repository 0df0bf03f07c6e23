//! Property-based tests for classification and routing invariants
//!
//! Streams are generated from well-formed device messages and fed through the
//! inline extractor in arbitrary chunkings, so every property is checked
//! against the same classifier the worker thread runs.

mod classification_invariants;
mod generators;
