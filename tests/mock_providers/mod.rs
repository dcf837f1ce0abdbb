//! Mock provider servers for integration tests
//!
//! - `gemini_mock` - WebSocket server speaking the Gemini Live protocol

// Not every test binary uses every helper
#![allow(dead_code)]

pub mod gemini_mock;

pub use gemini_mock::{GeminiMock, GeminiMockBehavior};
