//! 状态快照：持久化格式与恢复
//!
//! 快照只保存重建状态所需的三部分：任务列表、docker id -> 容器记录、docker id -> 任务 ARN。
//! 字段名保留（JSON），新增字段不影响旧快照的读取。
//!
//! 解码出来的容器记录各自带着一份容器描述的副本；恢复时按 ARN 找到任务、按名字找到任务内的容器，
//! 让 docker id 指向任务里那一份，副本丢弃。任何一步对不上都视为快照不完整，整个恢复失败。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::api::{DockerContainer, Task};
use crate::core::StateError;
use crate::state::store::StateInner;

/// 持久化的状态快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedState {
    #[serde(rename = "Tasks", default)]
    pub tasks: Vec<Task>,
    /// docker id -> 容器记录
    #[serde(rename = "IdToContainer", default)]
    pub id_to_container: HashMap<String, DockerContainer>,
    /// docker id -> 任务 ARN
    #[serde(rename = "IdToTask", default)]
    pub id_to_task: HashMap<String, String>,
}

/// 在锁外由快照重建一份完整的内部状态
pub(crate) fn rebuild(saved: SavedState) -> Result<StateInner, StateError> {
    let mut clean = StateInner::default();
    for task in saved.tasks {
        clean.add_task(task);
    }

    for (docker_id, container) in saved.id_to_container {
        let task_arn = saved.id_to_task.get(&docker_id).ok_or_else(|| {
            StateError::IncompleteSave(format!("There was no task for docker id {}", docker_id))
        })?;

        let name = container.container.name.clone();
        match clean.add_container(container, task_arn) {
            Ok(_) => {}
            Err(StateError::UnknownTask(arn)) => {
                return Err(StateError::IncompleteSave(format!(
                    "There was no task for arn {}",
                    arn
                )));
            }
            Err(StateError::UnknownContainer { task_arn, .. }) => {
                return Err(StateError::IncompleteSave(format!(
                    "Could not resolve container {} into task {} based on name",
                    name, task_arn
                )));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(clean)
}
