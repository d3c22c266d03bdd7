//! Anthropic Claude Messages API 与 `OpenAI` Chat Completions API 格式双向转换
//!
//! 功能：
//! - Claude 请求 → `OpenAI` Chat Completions 请求
//! - `OpenAI` Chat Completions 响应 → Claude 响应（非流式）
//! - `OpenAI` SSE 增量流 → Claude SSE 事件流（流式，见 [`StreamTransformer`]）

mod media;
mod request;
mod response;
mod schema;
mod stream;
mod tools;

pub use request::claude_request_to_chat;
pub use response::chat_response_to_claude;
pub use stream::StreamTransformer;
