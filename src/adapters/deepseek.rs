//! DeepSeek 适配器（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat (常规对话), deepseek-reasoner (思考模式)

use std::time::Duration;

use crate::adapters::OpenAiAdapter;
use crate::core::AdapterIdentity;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 创建 DeepSeek 镜像
///
/// - 模型可通过 `model` 参数或 `DEEPSEEK_MODEL` 环境变量指定，默认 `deepseek-chat`
/// - 未指定 `identity` 时镜像身份为 `deepseek/<model>`
pub fn create_deepseek_adapter(
    identity: Option<AdapterIdentity>,
    model: Option<&str>,
    api_key: &str,
    timeout: Duration,
) -> OpenAiAdapter {
    let model = model
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());
    let identity = identity.unwrap_or_else(|| AdapterIdentity::new(format!("deepseek/{model}")));

    OpenAiAdapter::new(
        identity,
        Some(DEEPSEEK_BASE_URL),
        &model,
        api_key,
        timeout,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterPort;

    #[test]
    fn test_identity_defaults_and_override() {
        let timeout = Duration::from_secs(10);
        let adapter = create_deepseek_adapter(None, Some(DEEPSEEK_REASONER), "test-key", timeout);
        assert_eq!(adapter.identity().as_str(), "deepseek/deepseek-reasoner");

        let adapter = create_deepseek_adapter(
            Some(AdapterIdentity::new("cloud/ds")),
            Some(DEEPSEEK_CHAT),
            "test-key",
            timeout,
        );
        assert_eq!(adapter.identity().as_str(), "cloud/ds");
    }
}
