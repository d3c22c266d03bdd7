pub mod handler;
pub mod model_resolver;
pub mod openai_compat;
pub mod service;

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};

/// HTTP 客户端类型别名
pub type HttpClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Salvo gateway handler
pub struct GatewayHandler {
    pub client: Arc<HttpClient>,
}

impl GatewayHandler {
    pub fn new() -> Self {
        // 创建支持 HTTP 和 HTTPS 的连接器
        // 使用 webpki-roots 内置证书，不依赖系统证书，提高跨平台稳定性
        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(https);

        Self {
            client: Arc::new(client),
        }
    }

    pub const fn client(&self) -> &Arc<HttpClient> {
        &self.client
    }
}
