//! 内存引擎：把任务记入 StateStore，不驱动任何容器
//!
//! 供 `berth` 二进制与测试使用。已知任务再次提交时只推进期望状态，不回退。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::api::Task;
use crate::core::EngineError;
use crate::engine::TaskEngine;
use crate::state::{StateStore, TaskAdmission};

#[derive(Debug)]
pub struct InMemoryTaskEngine {
    state: Arc<StateStore>,
    enabled: AtomicBool,
}

impl InMemoryTaskEngine {
    pub fn new(state: Arc<StateStore>) -> Self {
        Self {
            state,
            enabled: AtomicBool::new(true),
        }
    }

    /// 停止接收任务，之后的 add_task 返回 Disabled
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }
}

#[async_trait]
impl TaskEngine for InMemoryTaskEngine {
    async fn add_task(&self, task: Task) -> Result<(), EngineError> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Err(EngineError::Disabled);
        }

        let arn = task.arn.clone();
        let desired = task.desired_status;
        match self.state.add_or_advance_task(task).await {
            TaskAdmission::Added => {
                tracing::info!("Adding task {} with desired status {}", arn, desired);
            }
            TaskAdmission::Advanced { from } => {
                tracing::info!("Task {} desired status {} -> {}", arn, from, desired);
            }
            TaskAdmission::Unchanged => {
                tracing::debug!("Task {} already known, ignoring redelivery", arn);
            }
        }
        Ok(())
    }
}
