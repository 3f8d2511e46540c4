//! Berth - 主机代理的同步核心
//!
//! 模块划分：
//! - **api**: 任务、容器、状态与状态变更事件
//! - **channel**: 控制通道抽象与 JSON Lines 实现
//! - **config**: 配置加载（TOML + 环境变量）
//! - **core**: 错误类型与优雅关闭
//! - **dispatch**: 状态变更上报（按任务串行、全局限流、去重）
//! - **engine**: 任务引擎抽象与内存实现
//! - **ingest**: 任务载荷处理与 ack
//! - **observability**: 日志初始化
//! - **protocol**: 控制面消息与解码表
//! - **state**: 任务/容器状态存储与快照持久化

pub mod api;
pub mod channel;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod engine;
pub mod ingest;
pub mod observability;
pub mod protocol;
pub mod state;
