//! JSON Schema 清理
//!
//! 部分 `OpenAI` 兼容后端（如 Gemini 网关）对工具参数 schema 较严格，
//! 这里递归移除它们不支持的字段：
//! - 任意层级的 `$schema` 和 `additionalProperties`
//! - `type: "string"` 上白名单之外的 `format`

use serde_json::{Map, Value};

/// `string` 类型允许保留的 `format` 取值
const SUPPORTED_STRING_FORMATS: &[&str] = &["date-time", "enum"];

/// 递归清理 JSON Schema，返回新的 schema 值
///
/// 未知字段原样保留，任何输入都不会失败。
pub fn clean_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut cleaned = Map::new();
            for (key, value) in map {
                if key == "$schema" || key == "additionalProperties" {
                    continue;
                }
                cleaned.insert(key.clone(), clean_schema(value));
            }

            if cleaned.get("type").and_then(Value::as_str) == Some("string")
                && cleaned.contains_key("format")
            {
                let supported = cleaned
                    .get("format")
                    .and_then(Value::as_str)
                    .is_some_and(|format| SUPPORTED_STRING_FORMATS.contains(&format));
                if !supported {
                    cleaned.remove("format");
                }
            }

            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(items.iter().map(clean_schema).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_removes_schema_and_additional_properties() {
        let schema = json!({ "$schema": "http://json-schema.org/draft-07/schema#", "a": 1 });
        assert_eq!(clean_schema(&schema), json!({ "a": 1 }));

        let schema = json!({ "type": "object", "additionalProperties": false });
        assert_eq!(clean_schema(&schema), json!({ "type": "object" }));
    }

    #[test]
    fn test_removes_nested_fields() {
        let schema = json!({
            "type": "object",
            "properties": {
                "inner": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "name": { "type": "string", "format": "lowercase" }
                    }
                }
            }
        });
        let cleaned = clean_schema(&schema);
        let inner = &cleaned["properties"]["inner"];
        assert!(inner.get("additionalProperties").is_none());
        assert!(inner["properties"]["name"].get("format").is_none());
    }

    #[test]
    fn test_keeps_supported_string_formats() {
        let schema = json!({ "type": "string", "format": "date-time" });
        assert_eq!(clean_schema(&schema), schema);

        let schema = json!({ "type": "string", "format": "enum" });
        assert_eq!(clean_schema(&schema), schema);
    }

    #[test]
    fn test_removes_unsupported_string_format() {
        let schema = json!({ "type": "string", "format": "lowercase" });
        assert_eq!(clean_schema(&schema), json!({ "type": "string" }));

        // 非字符串的 format 值同样移除
        let schema = json!({ "type": "string", "format": 42 });
        assert_eq!(clean_schema(&schema), json!({ "type": "string" }));
    }

    #[test]
    fn test_format_kept_on_non_string_type() {
        let schema = json!({ "type": "number", "format": "double" });
        assert_eq!(clean_schema(&schema), schema);
    }

    #[test]
    fn test_recurses_into_arrays() {
        let schema = json!({
            "anyOf": [
                { "$schema": "x", "type": "string", "format": "uuid" },
                { "type": "integer" }
            ]
        });
        let cleaned = clean_schema(&schema);
        assert_eq!(
            cleaned,
            json!({ "anyOf": [ { "type": "string" }, { "type": "integer" } ] })
        );
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(clean_schema(&json!(null)), json!(null));
        assert_eq!(clean_schema(&json!("text")), json!("text"));
        assert_eq!(clean_schema(&json!(3)), json!(3));
    }
}
