pub mod assembler;
pub mod batch;
pub mod chat_stream;
pub mod config;
pub mod constants;
pub mod conversation;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod payload;
pub mod rethink;
pub mod session;
pub mod template;
pub mod tools;
