mod response;
mod utils;

use std::sync::Arc;

use bytes::Bytes;
use chrono::Local;
use futures_util::StreamExt;
use http_body_util::{BodyExt, BodyStream, Full};
use hyper::{
    Request as HyperRequest,
    header::{HeaderName, HeaderValue},
};
use salvo::{
    http::{Method, ResBody},
    prelude::*,
};
use serde_json::{Value, json};
use tracing::{error, info};

use crate::gateway::{
    handler::{
        response::decompress_gzip_if_needed,
        utils::{apply_cors_headers, render_json, render_json_error, setup_handler_state},
    },
    model_resolver::{apply_redirection, resolve_target},
    openai_compat::{StreamTransformer, chat_response_to_claude, claude_request_to_chat},
    service::{log_body_chunked, log_request_info},
};

/// 健康检查端点
#[handler]
pub async fn health_check(res: &mut Response) {
    render_json(
        res,
        StatusCode::OK,
        &json!({ "status": "ok", "timestamp": Local::now().to_rfc3339() }),
    );
}

/// 代理请求 handler：Claude Messages 请求 → 上游 Chat Completions
#[handler]
pub async fn claude_proxy(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let (config, client) = match setup_handler_state(depot) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Failed to get dependencies from depot: {e}");
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            return;
        }
    };
    let cfg = Arc::clone(&config.get());

    apply_cors_headers(res);

    // CORS 预检
    if req.method() == Method::OPTIONS {
        res.status_code(StatusCode::OK);
        return;
    }

    let uri = req.uri().to_string();
    if req.method() != Method::POST || !req.uri().path().contains("/v1/messages") {
        render_json_error(
            res,
            StatusCode::NOT_FOUND,
            "Not Found. Only /v1/messages endpoint is supported",
        );
        return;
    }

    log_request_info(req.method().as_str(), &uri, req.headers());

    // api key：配置优先，回退到请求头 x-api-key
    let api_key = if cfg.api_key.is_empty() {
        req.headers()
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    } else {
        cfg.api_key.clone()
    };

    // 收集请求体
    let body_bytes = match BodyExt::collect(req.body_mut()).await {
        Ok(body) => body.to_bytes(),
        Err(e) => {
            error!("Failed to collect request body: {}", e);
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            return;
        }
    };

    // 从路径解析目标模型；base_url 必须已配置
    let Some(model_name) = resolve_target(&uri) else {
        render_json_error(
            res,
            StatusCode::BAD_REQUEST,
            "Could not determine target model name. Ensure the URL format is \
             /<model>/v1/messages or /default/.../<model>/v1/messages.",
        );
        return;
    };
    if cfg.base_url.is_empty() {
        render_json_error(
            res,
            StatusCode::BAD_REQUEST,
            "Target base_url is not configured.",
        );
        return;
    }

    // 应用模型重定向
    let target_model = apply_redirection(&model_name, &cfg.model_redirections).to_string();
    if target_model != model_name {
        info!("模型重定向: {} -> {}", model_name, target_model);
    }

    let claude_request: Value = match serde_json::from_slice(&body_bytes) {
        Ok(v) => v,
        Err(_) => {
            render_json_error(res, StatusCode::BAD_REQUEST, "Request body must be JSON.");
            return;
        }
    };
    let stream = claude_request
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    // 响应里回显客户端请求的 model 字段，缺失时用解析出的目标模型
    let echo_model = claude_request
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(&target_model)
        .to_string();

    // 请求体格式转换：Claude → OpenAI Chat Completions
    let chat_request = match claude_request_to_chat(&claude_request, &target_model) {
        Ok(converted) => converted,
        Err(e) => {
            render_json_error(res, StatusCode::BAD_REQUEST, &e);
            return;
        }
    };
    let chat_body = match serde_json::to_vec(&chat_request) {
        Ok(v) => Bytes::from(v),
        Err(e) => {
            error!("Failed to serialize converted request: {}", e);
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            return;
        }
    };

    if cfg.log_req_body
        && let Ok(body_str) = std::str::from_utf8(&chat_body)
    {
        log_body_chunked("请求体", body_str);
    }

    let upstream_url = format!("{}/chat/completions", cfg.base_url.trim_end_matches('/'));
    info!("Proxying to: {}", upstream_url);

    let host = upstream_url
        .strip_prefix("https://")
        .or_else(|| upstream_url.strip_prefix("http://"))
        .unwrap_or(&upstream_url)
        .split('/')
        .next()
        .unwrap_or("")
        .to_string();

    // 构建代理请求；要求上游不压缩，流式字节才能直接进转换器
    let proxy_req = match HyperRequest::builder()
        .method(hyper::Method::POST)
        .uri(&upstream_url)
        .header("content-type", "application/json")
        .header("accept-encoding", "identity")
        .header("authorization", format!("Bearer {api_key}"))
        .header("host", host)
        .body(Full::new(chat_body))
    {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to build proxy request: {}", e);
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            return;
        }
    };

    // 使用共享的 HTTP 客户端发送请求
    let proxy_resp = match client.request(proxy_req).await {
        Ok(r) => r,
        Err(e) => {
            error!("Proxy request failed: {}", e);
            res.status_code(StatusCode::BAD_GATEWAY);
            res.render("Bad Gateway");
            return;
        }
    };

    let (parts, body) = proxy_resp.into_parts();

    // 上游错误：状态码和响应体原样透传，不转换也不重试
    if !parts.status.is_success() {
        let error_bytes = match BodyExt::collect(body).await {
            Ok(b) => b.to_bytes(),
            Err(e) => {
                error!("Failed to collect upstream error body: {}", e);
                res.status_code(StatusCode::BAD_GATEWAY);
                return;
            }
        };
        error!(
            "上游返回错误状态 {}: {}",
            parts.status,
            String::from_utf8_lossy(&error_bytes)
        );
        res.status_code(
            StatusCode::from_u16(parts.status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
        );
        if let Some(content_type) = parts.headers.get("content-type") {
            res.headers_mut().insert(
                HeaderName::from_static("content-type"),
                content_type.clone(),
            );
        }
        res.body(error_bytes.to_vec());
        return;
    }

    if stream {
        // SSE 流式转换：上游增量逐块喂给 StreamTransformer，产出即写出
        info!("=== SSE 流式响应开始 ===");
        res.status_code(StatusCode::OK);
        let headers = res.headers_mut();
        headers.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("text/event-stream"),
        );
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-cache"),
        );
        headers.insert(
            HeaderName::from_static("connection"),
            HeaderValue::from_static("keep-alive"),
        );

        let mut transformer = StreamTransformer::new(&echo_model);
        let event_stream = BodyStream::new(body)
            .filter_map(|frame| async move {
                match frame {
                    Ok(f) => f.into_data().ok(),
                    Err(e) => {
                        error!("SSE 流读取错误: {}", e);
                        None
                    }
                }
            })
            .map(move |data| futures_util::stream::iter(transformer.consume(&data)))
            .flatten()
            .map(Ok::<Bytes, std::convert::Infallible>);
        res.body(ResBody::stream(event_stream));
        return;
    }

    // 非流式：收集完整响应体后转换
    let body_bytes = match BodyExt::collect(body).await {
        Ok(b) => b.to_bytes(),
        Err(e) => {
            error!("Failed to collect response body: {}", e);
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            return;
        }
    };

    // 检查并解压 gzip 编码的响应体
    let content_encoding = parts
        .headers
        .get("content-encoding")
        .and_then(|v| v.to_str().ok());
    let body_bytes = decompress_gzip_if_needed(&body_bytes, content_encoding);

    // 响应体格式转换：OpenAI Chat Completions → Claude
    match chat_response_to_claude(&body_bytes, &echo_model) {
        Ok(converted) => {
            if cfg.log_res_body
                && let Ok(body_str) = std::str::from_utf8(&converted)
            {
                log_body_chunked("响应体", body_str);
            }
            res.status_code(StatusCode::OK);
            res.headers_mut().insert(
                HeaderName::from_static("content-type"),
                HeaderValue::from_static("application/json"),
            );
            res.body(converted.to_vec());
        }
        Err(e) => {
            // 转换失败是硬错误，向客户端透出错误信息
            error!("响应体格式转换失败: {}", e);
            render_json_error(res, StatusCode::INTERNAL_SERVER_ERROR, &e);
        }
    }
}
