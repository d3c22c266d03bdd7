use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use arc_swap::{ArcSwap, Guard};
use notify::{
    EventKind, RecursiveMode, Watcher,
    event::{AccessKind, AccessMode},
};
use serde::{Deserialize, Serialize};
use taplo::formatter;
use tracing::{error, info, warn};

/// 配置结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 监听地址
    #[serde(default = "default_listen")]
    pub listen: String,
    /// 上游 `OpenAI` 兼容接口的 base URL（如 `https://api.example.com/v1`）
    #[serde(default)]
    pub base_url: String,
    /// 上游 API 密钥；为空时回退到请求头 `x-api-key`
    #[serde(default)]
    pub api_key: String,
    /// 是否打印请求体
    #[serde(default)]
    pub log_req_body: bool,
    /// 是否打印响应体
    #[serde(default)]
    pub log_res_body: bool,
    /// 模型重定向表：请求路径中的模型名 → 上游实际模型名
    #[serde(default)]
    pub model_redirections: HashMap<String, String>,
}

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            base_url: String::new(),
            api_key: String::new(),
            log_req_body: false,
            log_res_body: false,
            model_redirections: HashMap::new(),
        }
    }
}

/// 全局原子配置，支持热重载
pub struct AtomicConfig {
    inner: ArcSwap<Config>,
    config_path: PathBuf,
}

/// 格式化 TOML 内容（统一 4 空格缩进），写回配置文件前使用
fn format_toml(input: &str) -> String {
    let options = formatter::Options {
        indent_string: "    ".to_string(),
        ..Default::default()
    };
    formatter::format(input, options)
}

impl AtomicConfig {
    /// 初始化配置，从指定路径或默认路径加载
    pub fn init() -> Self {
        let config_path = env::args()
            .nth(1)
            .map_or_else(|| PathBuf::from("config.toml"), PathBuf::from);

        info!("📂 正在加载配置文件: {:?}", config_path);

        let raw_content = fs::read_to_string(&config_path).unwrap_or_default();

        // 格式化TOML并写回文件
        let formatted_content = format_toml(&raw_content);
        if let Err(e) = fs::write(&config_path, formatted_content) {
            warn!("写入格式化配置失败: {}", e);
        }

        // 配置缺失或损坏不阻止启动：回退到默认配置（重定向表为空）
        let config = Self::load_from_file(&config_path).unwrap_or_else(|e| {
            warn!("⚠️  配置加载失败: {}，使用默认配置", e);
            Config::default()
        });

        Self::log_config(&config);

        Self {
            inner: ArcSwap::from(Arc::new(config)),
            config_path,
        }
    }

    /// 从文件加载配置
    fn load_from_file(path: impl AsRef<Path>) -> Result<Config, String> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {e}"))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| format!("Failed to parse TOML: {e}"))?;

        Ok(config)
    }

    fn log_config(config: &Config) {
        info!("✅ 配置已加载:");
        info!("listen: {}", config.listen);
        info!(
            "base_url: {}",
            if config.base_url.is_empty() {
                "(未设置)"
            } else {
                &config.base_url
            }
        );
        if config.api_key.is_empty() {
            info!("api_key: (未设置，使用请求头 x-api-key)");
        } else {
            info!(
                "api_key: {}***",
                config.api_key.chars().take(8).collect::<String>()
            );
        }
        info!("模型重定向: {} 条", config.model_redirections.len());
        for (from, to) in &config.model_redirections {
            info!("  {} -> {}", from, to);
        }
        info!(
            "log_req_body: {}, log_res_body: {}",
            config.log_req_body, config.log_res_body
        );
    }

    /// 获取当前配置的 Guard（读操作）
    pub fn get(&self) -> Guard<Arc<Config>> {
        self.inner.load()
    }

    /// 重新加载配置
    pub fn reload(&self) {
        // 添加短暂延迟，确保文件写入完成
        std::thread::sleep(Duration::from_millis(50));

        info!("🔄 检测到配置文件变更，正在重新加载...");

        match Self::load_from_file(&self.config_path) {
            Ok(new_config) => {
                self.inner.store(Arc::new(new_config.clone()));
                Self::log_config(&new_config);
            }
            Err(e) => {
                // 重载失败保留旧配置
                error!("❌ 配置重载失败: {}", e);
            }
        }
    }

    /// 启动配置文件监听（跨平台）
    ///
    /// 使用 `notify` crate 实现跨平台文件监听，支持 Windows/Linux/macOS
    /// 当文件被修改时自动重载配置
    pub fn start_watcher(self: Arc<Self>) {
        std::thread::spawn(move || {
            let config_path = self.config_path.clone();

            // 创建跨平台 watcher
            let mut watcher =
                match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                    match res {
                        Ok(event) => {
                            if matches!(
                                event.kind,
                                EventKind::Access(AccessKind::Close(AccessMode::Write))
                            ) {
                                std::thread::sleep(Duration::from_millis(50));
                                self.reload();
                            }
                        }
                        Err(e) => error!("Config watch error: {}", e),
                    }
                }) {
                    Ok(w) => w,
                    Err(e) => {
                        error!("Failed to initialize watcher: {}", e);
                        return;
                    }
                };

            // 添加监听
            if let Err(e) = watcher.watch(&config_path, RecursiveMode::NonRecursive) {
                error!("Failed to add watch for config file: {}", e);
                return;
            }

            info!("👁️  配置文件监听已启动: {:?}", config_path);

            // 永久挂起线程，保 watcher 不被 drop
            std::thread::park();
        });
    }
}
