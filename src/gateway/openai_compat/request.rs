//! 请求格式转换
//!
//! Anthropic Claude 请求 → `OpenAI` Chat Completions 请求
//!
//! 主要转换：
//! - system → 首条 system 消息
//! - messages[] → messages[]（`tool_result` 拆为独立的 tool 消息）
//! - `tool_use` → `tool_calls`
//! - tools[].`input_schema` → tools[].function.parameters（经 schema 清理）
//! - `max_tokens` → 截取到 [1, 8192]

use std::borrow::Cow;

use rayon::prelude::*;
use serde_json::{Map, Value, json};

use super::media;
use super::tools;

/// `max_tokens` 允许的上限（多数 Chat Completions 后端的硬限制）
const MAX_TOKENS_LIMIT: i64 = 8192;

/// Anthropic Claude 请求 → `OpenAI` Chat Completions 请求
pub fn claude_request_to_chat(request: &Value, model: &str) -> Result<Value, String> {
    let Some(object) = request.as_object() else {
        return Err("Request body must be a JSON object.".to_string());
    };

    let Some(messages) = object.get("messages").and_then(Value::as_array) else {
        return Err("Request must include messages.".to_string());
    };

    let mut chat_messages = Vec::new();
    if let Some(system) = object.get("system")
        && let Some(text) = claude_system_to_text(system)
        && !text.trim().is_empty()
    {
        chat_messages.push(json!({ "role": "system", "content": text }));
    }

    let per_message: Vec<Vec<Value>> = messages
        .par_iter()
        .map(claude_message_to_chat_messages)
        .collect();
    chat_messages.extend(per_message.into_iter().flatten());

    let mut out = Map::new();
    out.insert("model".to_string(), Value::String(model.to_string()));
    out.insert("messages".to_string(), Value::Array(chat_messages));

    if let Some(max_tokens) = object.get("max_tokens").and_then(Value::as_i64) {
        out.insert(
            "max_tokens".to_string(),
            Value::Number(max_tokens.clamp(1, MAX_TOKENS_LIMIT).into()),
        );
    }

    // temperature / top_p / stream / stop_sequences 原样透传（缺失则省略）
    for (from, to) in [
        ("temperature", "temperature"),
        ("top_p", "top_p"),
        ("stream", "stream"),
        ("stop_sequences", "stop"),
    ] {
        if let Some(value) = object.get(from) {
            out.insert(to.to_string(), value.clone());
        }
    }

    if let Some(tools_value) = object.get("tools") {
        out.insert(
            "tools".to_string(),
            tools::map_claude_tools_to_chat(tools_value),
        );
    }

    if let Some(tool_choice) = tools::map_claude_tool_choice_to_chat(object.get("tool_choice")) {
        out.insert("tool_choice".to_string(), tool_choice);
    }

    Ok(Value::Object(out))
}

/// 单条 Claude 消息 → 零或多条 Chat Completions 消息
///
/// user 消息中的 `tool_result` 块各自拆为一条 tool 消息，且先于
/// 其余块合并成的 user 消息输出；assistant 消息的文本块按换行合并，
/// `tool_use` 块收集为 `tool_calls`。
fn claude_message_to_chat_messages(message: &Value) -> Vec<Value> {
    let mut chat_messages = Vec::new();

    let Some(message) = message.as_object() else {
        return chat_messages;
    };
    let role = message
        .get("role")
        .and_then(Value::as_str)
        .unwrap_or("user");

    match role {
        "user" => match message.get("content") {
            Some(Value::Array(blocks)) => {
                let (tool_results, other): (Vec<&Value>, Vec<&Value>) = blocks
                    .iter()
                    .partition(|b| b.get("type").and_then(Value::as_str) == Some("tool_result"));

                for block in tool_results {
                    chat_messages.push(claude_tool_result_to_tool_message(block));
                }

                let parts: Vec<Value> = other
                    .iter()
                    .filter_map(|b| claude_block_to_user_part(b))
                    .collect();
                if !parts.is_empty() {
                    chat_messages.push(json!({ "role": "user", "content": parts }));
                }
            }
            Some(Value::String(text)) => {
                chat_messages.push(json!({ "role": "user", "content": text }));
            }
            _ => {}
        },
        "assistant" => {
            let blocks: &[Value] = message
                .get("content")
                .and_then(Value::as_array)
                .map_or(&[], |items| items.as_slice());

            let mut text_parts = Vec::new();
            let mut tool_calls = Vec::new();
            for block in blocks {
                let Some(block) = block.as_object() else {
                    continue;
                };
                match block.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            text_parts.push(text);
                        }
                    }
                    Some("tool_use") => {
                        let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                        let arguments =
                            serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
                        tool_calls.push(json!({
                            "id": block.get("id").and_then(Value::as_str).unwrap_or(""),
                            "type": "function",
                            "function": {
                                "name": block.get("name").and_then(Value::as_str).unwrap_or(""),
                                "arguments": arguments
                            }
                        }));
                    }
                    _ => {}
                }
            }

            let content = if text_parts.is_empty() {
                Value::Null
            } else {
                Value::String(text_parts.join("\n"))
            };
            let mut out = Map::new();
            out.insert("role".to_string(), json!("assistant"));
            out.insert("content".to_string(), content);
            if !tool_calls.is_empty() {
                out.insert("tool_calls".to_string(), Value::Array(tool_calls));
            }
            chat_messages.push(Value::Object(out));
        }
        _ => {}
    }

    chat_messages
}

/// Claude `tool_result` 块 → `OpenAI` tool 消息
fn claude_tool_result_to_tool_message(block: &Value) -> Value {
    let tool_use_id = block
        .get("tool_use_id")
        .and_then(Value::as_str)
        .unwrap_or("");
    let content: Cow<'_, str> = match block.get("content") {
        Some(Value::String(text)) => Cow::Borrowed(text.as_str()),
        Some(other) => Cow::Owned(serde_json::to_string(other).unwrap_or_default()),
        None => Cow::Borrowed(""),
    };
    json!({
        "role": "tool",
        "tool_call_id": tool_use_id,
        "content": content
    })
}

/// user 消息里的非 `tool_result` 块 → Chat Completions 内容片段
fn claude_block_to_user_part(block: &Value) -> Option<Value> {
    let block = block.as_object()?;
    match block.get("type").and_then(Value::as_str) {
        Some("text") => {
            let text = block.get("text").and_then(Value::as_str)?;
            Some(json!({ "type": "text", "text": text }))
        }
        _ => media::claude_image_block_to_image_url_part(block),
    }
}

fn claude_system_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => {
            let texts = items
                .iter()
                .filter_map(|item| item.as_object())
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
        _ => None,
    }
}
