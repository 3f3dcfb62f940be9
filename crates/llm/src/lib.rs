//! LLM integration crate for the Colloquy answering engine.
//!
//! This crate provides a provider-agnostic abstraction for interacting with
//! Large Language Models (LLMs). It supports multiple providers through a
//! unified trait-based interface, plus the `ProviderRegistry` that the
//! answer pipeline depends on for per-step model routing.
//!
//! # Providers
//! - **Ollama**: local LLM runtime (default, no credentials)
//! - **OpenAI**: chat completions + embeddings
//! - **Gemini**: generateContent + embedContent
//!
//! # Example
//! ```no_run
//! use colloquy_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Hello, world!");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod providers;
pub mod registry;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use providers::{GeminiClient, OllamaClient, OpenAiClient};
pub use registry::{ProviderRegistry, StepTimeouts};
