//! # tidytask-inference
//!
//! Completion service backends for tidytask task enrichment.
//!
//! The enrichment pipeline consumes text completion as an opaque
//! [`CompletionBackend`](tidytask_core::CompletionBackend). This crate
//! provides:
//! - OpenAI-compatible chat completion backend (feature `openai`, default),
//!   usable with OpenAI, OpenRouter, Ollama's `/v1` endpoint, vLLM, etc.
//! - A scripted mock backend for deterministic tests (feature `mock`)
//!
//! # Example
//!
//! ```rust,no_run
//! use tidytask_core::{ChatMessage, CompletionBackend, CompletionRequest};
//! use tidytask_inference::OpenAIBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::from_env().unwrap();
//!     let completion = backend
//!         .complete(CompletionRequest {
//!             system: None,
//!             messages: vec![ChatMessage::user("Say hi")],
//!             max_tokens: 16,
//!             temperature: 0.0,
//!         })
//!         .await
//!         .unwrap();
//!     println!("{}", completion.content);
//! }
//! ```

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use tidytask_core::*;

#[cfg(feature = "openai")]
pub use openai::{OpenAIBackend, OpenAIConfig};

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockCompletionBackend, MockReply};
