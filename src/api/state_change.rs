//! 状态变更事件：容器或任务的状态迁移，由 EventDispatcher 发往控制面

use serde::{Deserialize, Serialize};

use crate::api::Status;

/// 任务状态变更
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStateChange {
    pub task_arn: String,
    pub status: Status,
    /// 非正常停止时的原因
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// 该任务已发送过的最高状态；不上线
    #[serde(skip)]
    pub sent_status: Option<Status>,
}

impl TaskStateChange {
    pub fn new(task_arn: impl Into<String>, status: Status) -> Self {
        Self {
            task_arn: task_arn.into(),
            status,
            reason: None,
            sent_status: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_sent_status(mut self, sent: Status) -> Self {
        self.sent_status = Some(sent);
        self
    }
}

impl std::fmt::Display for TaskStateChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.task_arn, self.status)?;
        if let Some(reason) = &self.reason {
            write!(f, ", Reason: {}", reason)?;
        }
        Ok(())
    }
}

/// 容器状态变更
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStateChange {
    pub task_arn: String,
    pub container_name: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip)]
    pub sent_status: Option<Status>,
}

impl ContainerStateChange {
    pub fn new(task_arn: impl Into<String>, container_name: impl Into<String>, status: Status) -> Self {
        Self {
            task_arn: task_arn.into(),
            container_name: container_name.into(),
            status,
            exit_code: None,
            reason: None,
            sent_status: None,
        }
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_sent_status(mut self, sent: Status) -> Self {
        self.sent_status = Some(sent);
        self
    }
}

impl std::fmt::Display for ContainerStateChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} -> {}", self.task_arn, self.container_name, self.status)?;
        if let Some(code) = self.exit_code {
            write!(f, ", Exit {}", code)?;
        }
        if let Some(reason) = &self.reason {
            write!(f, ", Reason: {}", reason)?;
        }
        Ok(())
    }
}

/// 入队的状态变更：容器或任务二选一
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChangeEvent {
    Container(ContainerStateChange),
    Task(TaskStateChange),
}

impl StateChangeEvent {
    pub fn task_arn(&self) -> &str {
        match self {
            StateChangeEvent::Container(c) => &c.task_arn,
            StateChangeEvent::Task(t) => &t.task_arn,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            StateChangeEvent::Container(c) => c.status,
            StateChangeEvent::Task(t) => t.status,
        }
    }

    pub fn sent_status(&self) -> Option<Status> {
        match self {
            StateChangeEvent::Container(c) => c.sent_status,
            StateChangeEvent::Task(t) => t.sent_status,
        }
    }
}

impl From<TaskStateChange> for StateChangeEvent {
    fn from(change: TaskStateChange) -> Self {
        StateChangeEvent::Task(change)
    }
}

impl From<ContainerStateChange> for StateChangeEvent {
    fn from(change: ContainerStateChange) -> Self {
        StateChangeEvent::Container(change)
    }
}

impl std::fmt::Display for StateChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateChangeEvent::Container(c) => write!(f, "ContainerChange: {}", c),
            StateChangeEvent::Task(t) => write!(f, "TaskChange: {}", t),
        }
    }
}
