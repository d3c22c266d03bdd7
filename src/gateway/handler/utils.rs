use std::sync::Arc;

use anyhow::{Result, bail};
use hyper::header::{HeaderName, HeaderValue};
use salvo::prelude::*;

use crate::{config::AtomicConfig, gateway::HttpClient};

pub fn setup_handler_state(depot: &Depot) -> Result<(&Arc<AtomicConfig>, &Arc<HttpClient>)> {
    // 获取配置和 HTTP 客户端
    let Ok(config) = depot.obtain::<Arc<AtomicConfig>>() else {
        bail!("AtomicConfig not found in depot");
    };
    let Ok(client) = depot.obtain::<Arc<HttpClient>>() else {
        bail!("HttpClient not found in depot");
    };
    Ok((config, client))
}

/// 在响应上附加宽松的 CORS 头
pub fn apply_cors_headers(res: &mut Response) {
    let headers = res.headers_mut();
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("Content-Type, Authorization, x-api-key, Anthropic-Version"),
    );
}

pub fn render_json(res: &mut Response, status: StatusCode, body: &serde_json::Value) {
    res.status_code(status);
    res.headers_mut().insert(
        HeaderName::from_static("content-type"),
        HeaderValue::from_static("application/json"),
    );
    res.body(body.to_string().into_bytes());
}

pub fn render_json_error(res: &mut Response, status: StatusCode, message: &str) {
    render_json(res, status, &serde_json::json!({ "error": message }));
}
