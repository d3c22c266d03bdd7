//! 工具定义和 `tool_choice` 格式转换
//!
//! Anthropic Messages API → `OpenAI` Chat Completions API 的工具格式转换：
//! - Anthropic: { name, description, `input_schema` }
//! - `OpenAI`: { type: "function", function: { name, description, parameters } }
//!
//! `input_schema` 会先经过 [`super::schema::clean_schema`] 清理。

use serde_json::{Map, Value, json};

use super::schema::clean_schema;

/// Anthropic tools → `OpenAI` Chat Completions tools
pub fn map_claude_tools_to_chat(value: &Value) -> Value {
    let Some(tools) = value.as_array() else {
        return Value::Array(Vec::new());
    };
    let mapped = tools.iter().filter_map(map_claude_tool).collect::<Vec<_>>();
    Value::Array(mapped)
}

fn map_claude_tool(value: &Value) -> Option<Value> {
    let tool = value.as_object()?;
    let name = tool.get("name").and_then(Value::as_str)?;

    let mut function = Map::new();
    function.insert("name".to_string(), Value::String(name.to_string()));
    if let Some(description) = tool.get("description") {
        function.insert("description".to_string(), description.clone());
    }
    if let Some(input_schema) = tool.get("input_schema") {
        function.insert("parameters".to_string(), clean_schema(input_schema));
    }

    Some(json!({ "type": "function", "function": function }))
}

/// Anthropic `tool_choice` → `OpenAI` `tool_choice`
///
/// `auto` 和 `any` 都映射为字面量 `"auto"`；指定工具映射为
/// { type: "function", function: { name } }；其余情况省略该字段。
pub fn map_claude_tool_choice_to_chat(tool_choice: Option<&Value>) -> Option<Value> {
    let tool_choice = tool_choice.and_then(Value::as_object)?;

    let choice_type = tool_choice
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("");
    match choice_type {
        "auto" | "any" => Some(json!("auto")),
        "tool" => {
            let name = tool_choice
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("");
            if name.is_empty() {
                None
            } else {
                Some(json!({ "type": "function", "function": { "name": name } }))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_tools_wraps_function_and_cleans_schema() {
        let tools = json!([{
            "name": "get_weather",
            "description": "查询天气",
            "input_schema": {
                "$schema": "http://json-schema.org/draft-07/schema#",
                "type": "object",
                "properties": { "city": { "type": "string", "format": "lowercase" } },
                "additionalProperties": false
            }
        }]);

        let mapped = map_claude_tools_to_chat(&tools);
        let function = &mapped[0]["function"];
        assert_eq!(mapped[0]["type"].as_str().unwrap(), "function");
        assert_eq!(function["name"].as_str().unwrap(), "get_weather");
        assert_eq!(function["description"].as_str().unwrap(), "查询天气");

        let parameters = &function["parameters"];
        assert!(parameters.get("$schema").is_none());
        assert!(parameters.get("additionalProperties").is_none());
        assert!(parameters["properties"]["city"].get("format").is_none());
    }

    #[test]
    fn test_map_tools_skips_nameless_entries() {
        let tools = json!([{ "description": "no name" }, { "name": "ok" }]);
        let mapped = map_claude_tools_to_chat(&tools);
        assert_eq!(mapped.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_tool_choice_auto_and_any() {
        assert_eq!(
            map_claude_tool_choice_to_chat(Some(&json!({ "type": "auto" }))),
            Some(json!("auto"))
        );
        assert_eq!(
            map_claude_tool_choice_to_chat(Some(&json!({ "type": "any" }))),
            Some(json!("auto"))
        );
    }

    #[test]
    fn test_tool_choice_named_tool() {
        let mapped =
            map_claude_tool_choice_to_chat(Some(&json!({ "type": "tool", "name": "get_weather" })));
        assert_eq!(
            mapped,
            Some(json!({ "type": "function", "function": { "name": "get_weather" } }))
        );
    }

    #[test]
    fn test_tool_choice_unknown_omitted() {
        assert_eq!(
            map_claude_tool_choice_to_chat(Some(&json!({ "type": "none" }))),
            None
        );
        assert_eq!(map_claude_tool_choice_to_chat(None), None);
    }
}
