//! Serverless llama.cpp inference worker.
//!
//! Loads one GGUF checkpoint at startup and turns single "generate text" jobs
//! into results, one at a time.

pub mod config;
pub mod gguf;
pub mod llm;
pub mod server;
pub mod worker;
