//! 同步核心的错误类型
//!
//! 每一层一个 thiserror 枚举：载荷处理（IngestError）、状态存储（StateError）、
//! 编排引擎（EngineError）、控制通道（ChannelError）、任务校验（TaskValidationError）、消息解码（DecodeError）。
//! 所有错误最终只体现为日志与「不确认」，不会让进程崩溃。

use thiserror::Error;

/// 处理单个载荷的结果错误；任一错误都意味着不发送 ack，由服务端重投
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Received a payload with no message id")]
    MissingMessageId,

    #[error("Error saving state for payload message, with messageId: {0}")]
    PersistenceFailure(String),

    #[error("All tasks not handled: {failed} task(s) failed in message {message_id}")]
    PartialTaskFailure { message_id: String, failed: usize },

    #[error("Payload handler already started")]
    AlreadyStarted,

    #[error("Payload handler stopped")]
    Stopped,
}

/// 状态存储的错误（快照恢复与持久化）
#[derive(Error, Debug)]
pub enum StateError {
    /// 快照引用不完整：docker id 找不到任务、任务找不到同名容器等
    #[error("Could not unmarshal state; incomplete save. {0}")]
    IncompleteSave(String),

    #[error("State decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("State io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Task {task_arn} has no container named {name}")]
    UnknownContainer { task_arn: String, name: String },
}

/// 编排引擎拒绝接收任务；调用方不区分具体原因，一律视为该任务失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Task engine disabled")]
    Disabled,

    #[error("Task rejected: {0}")]
    Rejected(String),
}

/// 控制通道发送失败；只记录日志，不在本层重试
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Control channel closed")]
    Closed,

    #[error("Control channel io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Request failed: {0}")]
    Request(String),
}

/// 线上任务描述无法转换为 Task
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    #[error("task has no arn")]
    MissingArn,

    #[error("task {arn} is missing field {field}")]
    MissingField { arn: String, field: &'static str },

    #[error("task {arn} has unknown desired status {status}")]
    UnknownStatus { arn: String, status: String },

    #[error("task {arn} has a container without a name")]
    UnnamedContainer { arn: String },

    #[error("task {arn} has duplicate container {name}")]
    DuplicateContainer { arn: String, name: String },

    /// 字段类型不符等无法解码的任务；能取到 arn 时保留
    #[error("task could not be decoded: {reason}")]
    Malformed { arn: Option<String>, reason: String },
}

/// 入站消息解码失败
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unrecognized message type: {0}")]
    UnrecognizedType(String),

    #[error("Malformed {kind}: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
