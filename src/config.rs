//! 代理配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BERTH__*` 覆盖（双下划线表示嵌套，如 `BERTH__DISPATCH__CONCURRENT_EVENT_CALLS=5`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::dispatch::DEFAULT_CONCURRENT_EVENT_CALLS;
use crate::ingest::DEFAULT_MESSAGE_BUFFER_SIZE;

/// 配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub ingest: IngestSection,
    #[serde(default)]
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub state: StateSection,
    #[serde(default)]
    pub shutdown: ShutdownSection,
}

/// [agent] 段：ack 中上报的身份
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_cluster")]
    pub cluster: String,
    /// 未配置时每次启动生成一个随机 ID
    #[serde(default = "default_container_instance_arn")]
    pub container_instance_arn: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            cluster: default_cluster(),
            container_instance_arn: default_container_instance_arn(),
        }
    }
}

fn default_cluster() -> String {
    "default".to_string()
}

fn default_container_instance_arn() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// [ingest] 段
#[derive(Debug, Clone, Deserialize)]
pub struct IngestSection {
    /// 载荷队列与 ack 队列容量；满时 submit 等待
    #[serde(default = "default_message_buffer_size")]
    pub message_buffer_size: usize,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            message_buffer_size: default_message_buffer_size(),
        }
    }
}

fn default_message_buffer_size() -> usize {
    DEFAULT_MESSAGE_BUFFER_SIZE
}

/// [dispatch] 段
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchSection {
    /// 同时处于发送中的任务 ARN 上限
    #[serde(default = "default_concurrent_event_calls")]
    pub concurrent_event_calls: usize,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            concurrent_event_calls: default_concurrent_event_calls(),
        }
    }
}

fn default_concurrent_event_calls() -> usize {
    DEFAULT_CONCURRENT_EVENT_CALLS
}

/// [state] 段
#[derive(Debug, Clone, Deserialize)]
pub struct StateSection {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StateSection {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from("data/agent-state.json")
}

/// [shutdown] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownSection {
    /// 每个清理任务的超时（秒）
    #[serde(default = "default_cleanup_timeout_secs")]
    pub cleanup_timeout_secs: u64,
}

impl Default for ShutdownSection {
    fn default() -> Self {
        Self {
            cleanup_timeout_secs: default_cleanup_timeout_secs(),
        }
    }
}

fn default_cleanup_timeout_secs() -> u64 {
    5
}

/// 加载配置：config/default.toml（若存在）-> 指定文件（若存在）-> 环境变量
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BERTH")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
