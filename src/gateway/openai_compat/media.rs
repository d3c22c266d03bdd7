//! 媒体内容格式转换
//!
//! Claude 图片块 → Chat Completions `image_url` 内容片段：
//! - Claude: { type: "image", source: { type: "base64", `media_type`, data } }
//! - `OpenAI`: { type: "`image_url`", `image_url`: { url: "data:xxx;base64,xxx" } }

use serde_json::{Map, Value, json};

/// Claude 图片块 → `OpenAI` `image_url` 片段
pub fn claude_image_block_to_image_url_part(block: &Map<String, Value>) -> Option<Value> {
    let source = block.get("source").and_then(Value::as_object)?;
    let media_type = source
        .get("media_type")
        .and_then(Value::as_str)
        .unwrap_or("image/png");
    let data = source.get("data").and_then(Value::as_str)?;
    Some(json!({
        "type": "image_url",
        "image_url": { "url": format!("data:{media_type};base64,{data}") }
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_image_block_to_data_url() {
        let block = json!({
            "type": "image",
            "source": { "type": "base64", "media_type": "image/jpeg", "data": "AAAA" }
        });
        let part = claude_image_block_to_image_url_part(block.as_object().unwrap()).unwrap();
        assert_eq!(
            part["image_url"]["url"].as_str().unwrap(),
            "data:image/jpeg;base64,AAAA"
        );
    }

    #[test]
    fn test_block_without_data_is_skipped() {
        let block = json!({ "type": "image", "source": { "type": "base64" } });
        assert!(claude_image_block_to_image_url_part(block.as_object().unwrap()).is_none());
    }
}
