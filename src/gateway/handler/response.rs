use std::io::Read;

use bytes::Bytes;
use flate2::read::GzDecoder;

/// 上游响应为 gzip 编码时解压，否则原样返回
///
/// 解压失败不视为致命错误，退回原始字节交由后续转换报错。
pub fn decompress_gzip_if_needed(body_bytes: &Bytes, content_encoding: Option<&str>) -> Bytes {
    let is_gzip = content_encoding.is_some_and(|enc| enc.to_lowercase().contains("gzip"));
    if !is_gzip {
        return body_bytes.clone();
    }

    let mut decoder = GzDecoder::new(&body_bytes[..]);
    let mut decompressed = Vec::new();
    match decoder.read_to_end(&mut decompressed) {
        Ok(_) => {
            tracing::debug!(
                "📦 gzip 解压成功: {} bytes → {} bytes",
                body_bytes.len(),
                decompressed.len()
            );
            decompressed.into()
        }
        Err(e) => {
            tracing::warn!("gzip 解压失败: {}，使用原始响应体", e);
            body_bytes.clone()
        }
    }
}
