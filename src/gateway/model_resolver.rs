//! 从请求路径解析目标模型名，并应用模型重定向表
//!
//! 路径规则（`/v1/messages` 之前的动态部分决定模型名）：
//! - `/gpt-4/v1/messages` -> `gpt-4`（首段即模型名）
//! - `/gpt-4/https/api.example.com/v1/messages` -> `gpt-4`
//! - `/default/https/api.example.com/v1/chat/gpt-4/v1/messages` -> `gpt-4`
//!   （首段为 `default` 时取末段）

use std::collections::HashMap;

/// 从请求路径解析目标模型名
///
/// 先剥离查询串和最后一个 `/v1/messages` 起的后缀，再按 `/` 切分出非空段。
/// 首段（忽略大小写）为 `default` 时取最后一段，否则取第一段。
/// 没有任何段时返回 `None`，调用方应以客户端错误拒绝请求。
pub fn resolve_target(path: &str) -> Option<String> {
    let path = path.split('?').next().unwrap_or(path);
    let dynamic = &path[..path.rfind("/v1/messages")?];
    let mut parts: Vec<&str> = dynamic.split('/').filter(|p| !p.is_empty()).collect();

    let first = parts.first()?;
    let model = if first.eq_ignore_ascii_case("default") {
        parts.pop()
    } else {
        Some(parts.remove(0))
    };
    model.map(str::to_string)
}

/// 应用模型重定向表；未命中时原样返回
pub fn apply_redirection<'a>(model: &'a str, table: &'a HashMap<String, String>) -> &'a str {
    table.get(model).map_or(model, String::as_str)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_first_segment() {
        assert_eq!(
            resolve_target("/gpt-4/https/api.example.com/v1/messages"),
            Some("gpt-4".to_string())
        );
        assert_eq!(
            resolve_target("/gpt-4/v1/messages"),
            Some("gpt-4".to_string())
        );
    }

    #[test]
    fn test_resolve_default_takes_last_segment() {
        assert_eq!(
            resolve_target("/default/https/api.example.com/v1/chat/gpt-4/v1/messages"),
            Some("gpt-4".to_string())
        );
        // default 的大小写不敏感
        assert_eq!(
            resolve_target("/DEFAULT/some/path/deepseek-chat/v1/messages"),
            Some("deepseek-chat".to_string())
        );
    }

    #[test]
    fn test_resolve_strips_query_string() {
        assert_eq!(
            resolve_target("/gpt-4/v1/messages?beta=true"),
            Some("gpt-4".to_string())
        );
    }

    #[test]
    fn test_resolve_uses_last_endpoint_suffix() {
        // 路径中间出现 /v1/messages 时以最后一次出现为准
        assert_eq!(
            resolve_target("/gpt-4/v1/messages/v1/messages"),
            Some("gpt-4".to_string())
        );
    }

    #[test]
    fn test_resolve_malformed_path() {
        assert_eq!(resolve_target("/v1/messages"), None);
        assert_eq!(resolve_target("/no/messages/endpoint"), None);
    }

    #[test]
    fn test_apply_redirection() {
        let mut table = HashMap::new();
        table.insert("gpt-4".to_string(), "deepseek-chat".to_string());

        assert_eq!(apply_redirection("gpt-4", &table), "deepseek-chat");
        assert_eq!(apply_redirection("gpt-3.5-turbo", &table), "gpt-3.5-turbo");
    }
}
