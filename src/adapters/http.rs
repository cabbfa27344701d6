//! reqwest 适配器共用部分：客户端构建、JSON POST、错误映射

use std::time::Duration;

use serde_json::Value;

use crate::adapters::{AdapterError, AdapterErrorKind};

/// 带超时的 reqwest 客户端；构建失败时退回默认客户端
pub(crate) fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("reqwest client build failed ({}), using defaults", e);
            reqwest::Client::new()
        })
}

/// 传输层错误 -> AdapterError
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> AdapterError {
    let kind = if err.is_timeout() {
        AdapterErrorKind::Timeout
    } else if let Some(status) = err.status() {
        AdapterErrorKind::from_status(status.as_u16())
    } else {
        AdapterErrorKind::Transport
    };
    AdapterError::new(kind, err.to_string())
}

/// 非 2xx 响应 -> AdapterError；正文中的内容策略提示归为 ContentRejected
pub(crate) fn map_http_error(status: u16, body: &str) -> AdapterError {
    let normalized_body: String = body.chars().take(240).collect();
    let lower = normalized_body.to_lowercase();
    let kind = if (400..500).contains(&status)
        && (lower.contains("safety") || (lower.contains("content") && lower.contains("policy")))
    {
        AdapterErrorKind::ContentRejected
    } else {
        AdapterErrorKind::from_status(status)
    };
    let message = if normalized_body.is_empty() {
        format!("backend returned status {status}")
    } else {
        format!("backend returned status {status}: {normalized_body}")
    };
    AdapterError::new(kind, message)
}

/// POST JSON 并解析为 Value
pub(crate) async fn post_json(
    request: reqwest::RequestBuilder,
    body: &Value,
) -> Result<Value, AdapterError> {
    let response = request.json(body).send().await.map_err(map_reqwest_error)?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(map_http_error(status.as_u16(), &text));
    }
    response.json::<Value>().await.map_err(|e| {
        AdapterError::new(
            AdapterErrorKind::Transport,
            format!("invalid response body: {e}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_http_error_kinds() {
        assert_eq!(map_http_error(401, "").kind, AdapterErrorKind::Auth);
        assert_eq!(map_http_error(429, "slow down").kind, AdapterErrorKind::RateLimited);
        assert_eq!(
            map_http_error(400, "request blocked by content policy").kind,
            AdapterErrorKind::ContentRejected
        );
        assert_eq!(map_http_error(503, "").kind, AdapterErrorKind::Transport);
        assert!(map_http_error(500, "boom").message.contains("boom"));
    }
}
