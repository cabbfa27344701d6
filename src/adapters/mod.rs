//! 镜像适配器：能力接口与各模型后端实现

pub mod anthropic;
pub mod deepseek;
pub mod factory;
pub mod gemini;
mod http;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod retry;
pub mod traits;

pub use anthropic::AnthropicAdapter;
pub use deepseek::create_deepseek_adapter;
pub use factory::{create_adapter, detect_mirrors, AdapterKind, MirrorSpec};
pub use gemini::GeminiAdapter;
pub use mock::MockAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;
pub use retry::{RetryConfig, RetryingAdapter};
pub use traits::{AdapterError, AdapterErrorKind, AdapterPort, ChamberRequest};
