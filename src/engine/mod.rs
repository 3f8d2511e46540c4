//! 编排引擎接口
//!
//! 同步核心只把校验后的任务交给引擎；真正的容器启停由引擎与运行时驱动负责。
//! 同一任务被重复提交（服务端重投）时，引擎必须把它当作无副作用的操作。

pub mod memory;

use async_trait::async_trait;

use crate::api::Task;
use crate::core::EngineError;

pub use memory::InMemoryTaskEngine;

/// 接收任务的编排引擎
#[async_trait]
pub trait TaskEngine: Send + Sync {
    /// 任何错误都表示「引擎暂不接收任务」，调用方不再细分
    async fn add_task(&self, task: Task) -> Result<(), EngineError>;
}
