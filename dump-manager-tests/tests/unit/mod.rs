//! Unit tests for dump-manager building blocks
//!
//! These tests exercise configuration, retention and argument redaction
//! through the public library API.

mod config;
mod redaction;
mod retention;
