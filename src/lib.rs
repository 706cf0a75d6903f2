//! qq sends quick queries to OpenAI-compatible chat endpoints and streams the
//! answer back, keeping chain-of-thought text apart from the visible answer.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the streaming pipeline: the chunk assembler that separates
//!   thought from visible text, conversation history, request payloads, the
//!   streaming session, tool execution, and the concurrent batch dispatcher.
//! - [`ui`] renders classified events to the terminal as plain or markdown
//!   text, with thoughts on a separate writer.
//! - [`commands`] implements the slash commands of the interactive chat.
//! - [`api`] defines the chat and model payloads exchanged with the endpoint.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which resolves configuration and dispatches
//! into completion, chat, template, or list mode.

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod ui;
pub mod utils;
