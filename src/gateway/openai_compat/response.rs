//! 响应格式转换（非流式）
//!
//! `OpenAI` Chat Completions 响应 → Anthropic Claude 响应
//!
//! 主要转换：
//! - choices[0].message.content → text 块
//! - `tool_calls` → `tool_use` 块（arguments 解析为结构化 input）
//! - `finish_reason` → `stop_reason`
//! - usage.prompt/completion → usage.input/output

use bytes::Bytes;
use serde_json::{Value, json};

/// `OpenAI` Chat Completions 响应 → Anthropic 响应
///
/// 要求恰好存在一个 choice；缺失 choice 或工具调用参数解析失败
/// 都是硬错误，由调用方返回 5xx。
pub fn chat_response_to_claude(body: &Bytes, model: &str) -> Result<Bytes, String> {
    let value: Value =
        serde_json::from_slice(body).map_err(|_| "Upstream response must be JSON.".to_string())?;
    let Some(object) = value.as_object() else {
        return Err("Upstream response must be a JSON object.".to_string());
    };

    let Some(choice) = object
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
    else {
        return Err("Upstream response contains no choices.".to_string());
    };
    let Some(message) = choice.get("message").and_then(Value::as_object) else {
        return Err("Upstream choice contains no message.".to_string());
    };

    let mut content = Vec::new();
    if let Some(text) = message.get("content").and_then(Value::as_str)
        && !text.is_empty()
    {
        content.push(json!({ "type": "text", "text": text }));
    }

    if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in tool_calls {
            content.push(chat_tool_call_to_tool_use(call)?);
        }
    }

    let finish_reason = choice.get("finish_reason").and_then(Value::as_str);
    let stop_reason = claude_stop_reason_from_finish_reason(finish_reason);

    let usage = object.get("usage").and_then(Value::as_object);
    let input_tokens = usage
        .and_then(|u| u.get("prompt_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let output_tokens = usage
        .and_then(|u| u.get("completion_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let out = json!({
        "id": object.get("id").and_then(Value::as_str).unwrap_or("msg_proxy"),
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": content,
        "stop_reason": stop_reason,
        "stop_sequence": null,
        "usage": {
            "input_tokens": input_tokens,
            "output_tokens": output_tokens
        }
    });

    serde_json::to_vec(&out)
        .map(Bytes::from)
        .map_err(|err| format!("Failed to serialize response: {err}"))
}

/// `tool_calls` 条目 → `tool_use` 块；arguments 必须是合法 JSON
fn chat_tool_call_to_tool_use(call: &Value) -> Result<Value, String> {
    let id = call.get("id").and_then(Value::as_str).unwrap_or("");
    let function = call.get("function").and_then(Value::as_object);
    let name = function
        .and_then(|f| f.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let arguments = function
        .and_then(|f| f.get("arguments"))
        .and_then(Value::as_str)
        .unwrap_or("{}");

    let input: Value = serde_json::from_str(arguments)
        .map_err(|e| format!("Failed to parse tool call arguments: {e}"))?;

    Ok(json!({
        "type": "tool_use",
        "id": id,
        "name": name,
        "input": input
    }))
}

/// `finish_reason` → `stop_reason`；未知值回退为 `end_turn`
fn claude_stop_reason_from_finish_reason(reason: Option<&str>) -> &'static str {
    match reason {
        Some("length") => "max_tokens",
        Some("tool_calls") => "tool_use",
        _ => "end_turn",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::gateway::openai_compat::claude_request_to_chat;
    use serde_json::json;

    fn convert(body: Value, model: &str) -> Result<Value, String> {
        let bytes = Bytes::from(serde_json::to_vec(&body).unwrap());
        chat_response_to_claude(&bytes, model).map(|out| serde_json::from_slice(&out).unwrap())
    }

    #[test]
    fn test_text_response() {
        let out = convert(
            json!({
                "id": "chatcmpl-123",
                "choices": [{
                    "message": { "content": "你好" },
                    "finish_reason": "stop"
                }],
                "usage": { "prompt_tokens": 12, "completion_tokens": 3 }
            }),
            "gpt-4",
        )
        .unwrap();

        assert_eq!(out["id"].as_str().unwrap(), "chatcmpl-123");
        assert_eq!(out["model"].as_str().unwrap(), "gpt-4");
        assert_eq!(out["stop_reason"].as_str().unwrap(), "end_turn");
        let content = out["content"].as_array().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0]["text"].as_str().unwrap(), "你好");
        assert_eq!(out["usage"]["input_tokens"].as_u64().unwrap(), 12);
        assert_eq!(out["usage"]["output_tokens"].as_u64().unwrap(), 3);
    }

    #[test]
    fn test_tool_calls_become_tool_use_blocks() {
        let out = convert(
            json!({
                "id": "chatcmpl-456",
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "function": { "name": "get_weather",
                                          "arguments": "{\"city\":\"Beijing\"}" }
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            }),
            "gpt-4",
        )
        .unwrap();

        assert_eq!(out["stop_reason"].as_str().unwrap(), "tool_use");
        let content = out["content"].as_array().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0]["type"].as_str().unwrap(), "tool_use");
        assert_eq!(content[0]["id"].as_str().unwrap(), "call_1");
        assert_eq!(content[0]["input"], json!({ "city": "Beijing" }));
    }

    #[test]
    fn test_finish_reason_mapping() {
        let base = |reason: Value| {
            convert(
                json!({
                    "choices": [{ "message": { "content": "x" }, "finish_reason": reason }]
                }),
                "m",
            )
            .unwrap()["stop_reason"]
                .clone()
        };

        assert_eq!(base(json!("stop")), json!("end_turn"));
        assert_eq!(base(json!("length")), json!("max_tokens"));
        assert_eq!(base(json!("tool_calls")), json!("tool_use"));
        assert_eq!(base(json!("content_filter")), json!("end_turn"));
        assert_eq!(base(Value::Null), json!("end_turn"));
    }

    #[test]
    fn test_missing_choice_is_hard_error() {
        assert!(convert(json!({ "choices": [] }), "m").is_err());
        assert!(convert(json!({ "id": "x" }), "m").is_err());
    }

    #[test]
    fn test_bad_tool_arguments_is_hard_error() {
        let result = convert(
            json!({
                "choices": [{
                    "message": {
                        "tool_calls": [{
                            "id": "call_1",
                            "function": { "name": "f", "arguments": "{not json" }
                        }]
                    }
                }]
            }),
            "m",
        );
        assert!(result.is_err());
    }

    /// 请求转换后模拟上游回显，再经响应转换还原：工具名和 input 结构保持一致
    #[test]
    fn test_round_trip_preserves_tool_structure() {
        let claude_request = json!({
            "messages": [
                { "role": "user", "content": "查天气" },
                {
                    "role": "assistant",
                    "content": [
                        { "type": "tool_use", "id": "call_1", "name": "get_weather",
                          "input": { "city": "Beijing", "days": 3 } }
                    ]
                }
            ]
        });
        let chat_request = claude_request_to_chat(&claude_request, "gpt-4").unwrap();
        let call = &chat_request["messages"][1]["tool_calls"][0];

        // 上游把请求里的 tool_call 原样回显到响应中
        let echoed = json!({
            "id": "chatcmpl-echo",
            "choices": [{
                "message": { "content": null, "tool_calls": [call.clone()] },
                "finish_reason": "tool_calls"
            }]
        });
        let out = convert(echoed, "gpt-4").unwrap();

        let block = &out["content"][0];
        assert_eq!(block["name"].as_str().unwrap(), "get_weather");
        assert_eq!(block["input"], json!({ "city": "Beijing", "days": 3 }));
    }
}
