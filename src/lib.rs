//! Colloquy: a per-session LLM chat agent server.
//!
//! Each conversation is a stateful session actor addressed by an opaque
//! identifier. The HTTP layer exposes four operations per session (chat,
//! read state, configure, clear); the inference layer drives an
//! OpenAI-compatible AI gateway with optional fragment streaming and a
//! typed capability loop.

pub mod api;
pub mod llm;
pub mod session;
pub mod tools;
