//! OpenAI-compatible completion backend.
//!
//! Works against any endpoint that implements `POST /chat/completions`:
//! OpenAI, OpenRouter, Ollama (`/v1`), vLLM, LocalAI, LM Studio.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OPENAI_BASE_URL` | `https://api.openai.com/v1` | API endpoint |
//! | `OPENAI_API_KEY` | (none) | Bearer token (optional for local endpoints) |
//! | `OPENAI_GEN_MODEL` | `gpt-4o-mini` | Chat model |
//! | `OPENAI_TIMEOUT` | `30` | Request timeout (seconds) |
//! | `OPENAI_HTTP_REFERER` | (none) | OpenRouter ranking header |
//! | `OPENAI_X_TITLE` | (none) | OpenRouter app name header |

mod backend;
mod error;
mod types;

pub use backend::{OpenAIBackend, OpenAIConfig};
pub use error::{to_tidytask_error, OpenAIErrorCode};
pub use types::*;
