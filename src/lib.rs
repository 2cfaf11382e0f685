//! Locutor is a terminal chat client for locally hosted language models.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the chat session: the lifecycle state machine, streaming
//!   orchestration, transcript storage and persistence, and the backend
//!   client contract with its HTTP implementation.
//! - [`api`] defines the wire payloads exchanged with OpenAI-compatible
//!   local model servers.
//! - [`cli`] parses command-line arguments and runs the line-oriented chat
//!   driver that feeds user input to the session and prints chunks as they
//!   stream in.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`cli::run`].

pub mod api;
pub mod cli;
pub mod core;
pub mod logging;
pub mod utils;
