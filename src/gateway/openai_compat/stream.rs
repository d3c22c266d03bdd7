//! 流式响应转换
//!
//! `OpenAI` Chat Completions SSE 增量流 → Anthropic Claude SSE 事件流。
//!
//! 每个流式响应对应一个 [`StreamTransformer`] 实例，按到达顺序喂入原始字节块，
//! 产出 Claude 格式的 SSE 事件帧。上游字节块的边界是任意的（可能在行中间
//! 甚至 JSON 对象中间截断），实例内部用字节缓冲保留末尾未完结的行，
//! 下一块到达时续上。
//!
//! 事件顺序约定：
//! 1. 首次调用先发 `message_start` + index 0 的 text `content_block_start`
//! 2. 文本增量 → index 0 的 `content_block_delta`
//! 3. 工具调用增量按上游 slot 多路复用，id+name 齐全的瞬间分配新的
//!    块索引并发 `content_block_start`，之后参数片段原样透传为
//!    `input_json_delta`
//! 4. `[DONE]` → 依序关闭所有块，发 `message_delta`（带 `stop_reason`）
//!    和 `message_stop`，此后实例不再产出任何事件

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::{Value, json};
use uuid::Uuid;

/// 上游 SSE 数据行前缀
const DATA_PREFIX: &str = "data: ";
/// 上游流结束哨兵（trim 后精确匹配，大小写敏感）
const DONE_SENTINEL: &str = "[DONE]";

/// 单个上游工具调用 slot 的跟踪状态
#[derive(Default)]
struct ToolCallState {
    id: String,
    name: String,
    /// 已累计的参数文本；started 之前只累计不发送
    arguments: String,
    /// Claude 侧的内容块索引，started 时分配
    claude_index: usize,
    started: bool,
}

/// 流式转换器，一个流式交换一个实例
///
/// `consume` 必须按字节到达顺序串行调用；实例内部状态不支持并发修改。
/// 交换结束（正常或出错）后直接丢弃实例即可，它不持有任何外部资源。
pub struct StreamTransformer {
    model: String,
    message_id: String,
    initialized: bool,
    done: bool,
    /// 末尾未完结行的字节缓冲
    buffer: Vec<u8>,
    /// 上游 slot index → 跟踪状态
    tool_calls: HashMap<u64, ToolCallState>,
    /// Claude 侧内容块索引计数；0 固定留给 text 块
    next_block_index: usize,
    /// 最近一次解析到的 `finish_reason`，跨块保留，[DONE] 时映射为 `stop_reason`
    last_finish_reason: Option<String>,
}

/// 编码单个 SSE 事件帧
fn sse_event(event: &str, data: &Value) -> Bytes {
    Bytes::from(format!("event: {event}\ndata: {data}\n\n"))
}

impl StreamTransformer {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            message_id: format!("msg_{}", Uuid::new_v4().simple()),
            initialized: false,
            done: false,
            buffer: Vec::new(),
            tool_calls: HashMap::new(),
            next_block_index: 0,
            last_finish_reason: None,
        }
    }

    /// 喂入一块上游原始字节，返回产出的 Claude SSE 事件帧序列
    pub fn consume(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        if !self.initialized {
            events.push(sse_event(
                "message_start",
                &json!({
                    "type": "message_start",
                    "message": {
                        "id": self.message_id,
                        "type": "message",
                        "role": "assistant",
                        "model": self.model,
                        "content": [],
                        "stop_reason": null,
                        "usage": { "input_tokens": 0, "output_tokens": 0 }
                    }
                }),
            ));
            events.push(sse_event(
                "content_block_start",
                &json!({
                    "type": "content_block_start",
                    "index": 0,
                    "content_block": { "type": "text", "text": "" }
                }),
            ));
            self.initialized = true;
        }

        self.buffer.extend_from_slice(chunk);

        // 逐行消费；末尾不带换行的片段留在缓冲里等下一块
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..pos]);
            self.process_line(&line, &mut events);
            if self.done {
                self.buffer.clear();
                break;
            }
        }

        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<Bytes>) {
        // 非数据行（注释、空行分隔符等）直接忽略
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };

        if payload.trim() == DONE_SENTINEL {
            self.finalize(events);
            return;
        }

        // 单行解析失败只丢弃该行，流继续
        let Ok(parsed) = serde_json::from_str::<Value>(payload) else {
            return;
        };
        let choice = parsed.get("choices").and_then(|c| c.get(0));

        if let Some(reason) = choice
            .and_then(|c| c.get("finish_reason"))
            .and_then(Value::as_str)
        {
            self.last_finish_reason = Some(reason.to_string());
        }

        let Some(delta) = choice.and_then(|c| c.get("delta")) else {
            return;
        };

        if let Some(text) = delta.get("content").and_then(Value::as_str)
            && !text.is_empty()
        {
            events.push(sse_event(
                "content_block_delta",
                &json!({
                    "type": "content_block_delta",
                    "index": 0,
                    "delta": { "type": "text_delta", "text": text }
                }),
            ));
        }

        if let Some(tool_deltas) = delta.get("tool_calls").and_then(Value::as_array) {
            for entry in tool_deltas {
                self.apply_tool_call_delta(entry, events);
            }
        }
    }

    /// 合并一条工具调用增量
    ///
    /// id 和 name 可能分散在多条增量中；两者首次齐全的瞬间分配 Claude
    /// 块索引并发出 `content_block_start`，同时把此前累计的参数文本
    /// 一次性补发，之后的参数片段即到即发。
    fn apply_tool_call_delta(&mut self, entry: &Value, events: &mut Vec<Bytes>) {
        let Some(slot) = entry.get("index").and_then(Value::as_u64) else {
            return;
        };
        let state = self.tool_calls.entry(slot).or_default();
        let was_started = state.started;

        if let Some(id) = entry.get("id").and_then(Value::as_str)
            && !id.is_empty()
        {
            state.id = id.to_string();
        }
        let function = entry.get("function");
        if let Some(name) = function
            .and_then(|f| f.get("name"))
            .and_then(Value::as_str)
            && !name.is_empty()
        {
            state.name = name.to_string();
        }
        let fragment = function
            .and_then(|f| f.get("arguments"))
            .and_then(Value::as_str)
            .filter(|f| !f.is_empty());
        if let Some(fragment) = fragment {
            state.arguments.push_str(fragment);
        }

        if !state.started && !state.id.is_empty() && !state.name.is_empty() {
            self.next_block_index += 1;
            state.claude_index = self.next_block_index;
            state.started = true;
            events.push(sse_event(
                "content_block_start",
                &json!({
                    "type": "content_block_start",
                    "index": state.claude_index,
                    "content_block": {
                        "type": "tool_use",
                        "id": state.id,
                        "name": state.name,
                        "input": {}
                    }
                }),
            ));
            // 起始前累计的参数文本（含本条携带的片段）一次性补发
            if !state.arguments.is_empty() {
                events.push(sse_event(
                    "content_block_delta",
                    &json!({
                        "type": "content_block_delta",
                        "index": state.claude_index,
                        "delta": { "type": "input_json_delta", "partial_json": state.arguments }
                    }),
                ));
            }
        } else if was_started && let Some(fragment) = fragment {
            events.push(sse_event(
                "content_block_delta",
                &json!({
                    "type": "content_block_delta",
                    "index": state.claude_index,
                    "delta": { "type": "input_json_delta", "partial_json": fragment }
                }),
            ));
        }
    }

    /// 收到 `[DONE]`：关闭全部内容块并结束消息
    fn finalize(&mut self, events: &mut Vec<Bytes>) {
        events.push(sse_event(
            "content_block_stop",
            &json!({ "type": "content_block_stop", "index": 0 }),
        ));

        let mut started_indices: Vec<usize> = self
            .tool_calls
            .values()
            .filter(|tc| tc.started)
            .map(|tc| tc.claude_index)
            .collect();
        started_indices.sort_unstable();
        for index in started_indices {
            events.push(sse_event(
                "content_block_stop",
                &json!({ "type": "content_block_stop", "index": index }),
            ));
        }

        let stop_reason = match self.last_finish_reason.as_deref() {
            Some("tool_calls") => "tool_use",
            Some("length") => "max_tokens",
            _ => "end_turn",
        };
        events.push(sse_event(
            "message_delta",
            &json!({
                "type": "message_delta",
                "delta": { "stop_reason": stop_reason, "stop_sequence": null },
                "usage": { "output_tokens": 0 }
            }),
        ));
        events.push(sse_event("message_stop", &json!({ "type": "message_stop" })));

        self.done = true;
    }
}
