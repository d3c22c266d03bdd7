use http::HeaderMap;
use tracing::{info, warn};

/// 打印请求行和全部请求头
pub fn log_request_info(method: &str, uri: &str, headers: &HeaderMap) {
    info!("=== 请求头 ===");
    info!("Method: {}", method);
    info!("URI: {}", uri);

    for (name, value) in headers {
        if let Ok(value_str) = value.to_str() {
            info!("{}: {}", name, value_str);
        }
    }
    info!("=== 请求头结束 ===");
}

/// 分段打印大字符串，避免日志截断和字符边界 panic
pub fn log_body_chunked(label: &str, body: &str) {
    const CHUNK_SIZE: usize = 8000;

    let len = body.len();
    info!("=== {} (共 {} 字节) ===", label, len);

    if len <= CHUNK_SIZE {
        info!("{}", body);
    } else {
        let total_chunks = len.div_ceil(CHUNK_SIZE);
        let mut start = 0;

        for i in 0..total_chunks {
            let mut end = (start + CHUNK_SIZE).min(len);

            // 结束位置必须落在字符边界上（UTF-8 safe）
            while end < len && !body.is_char_boundary(end) {
                end -= 1;
            }

            if let Some(chunk) = body.get(start..end) {
                info!("--- 第 {}/{} 段 ---\n{}", i + 1, total_chunks, chunk);
            } else {
                warn!("无法获取第 {}/{} 段内容", i + 1, total_chunks);
                break;
            }

            start = end;
        }
    }
    info!("=== {} 结束 ===", label);
}
