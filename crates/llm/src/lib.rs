//! Text-generation providers used by the agent.
//!
//! The agent only needs single-turn, plain-text completions, so the surface is
//! one object-safe trait plus an HTTP implementation and a mock.

pub mod http;
pub mod provider;
