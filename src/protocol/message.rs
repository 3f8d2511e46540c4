//! 控制面消息格式
//!
//! 入站：PayloadMessage（任务定义）、心跳、关闭与异常通知；出站：ack 与状态变更。
//! 线上字段统一 camelCase；外层信封为 `{"type": <标签>, "message": {...}}`。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{ContainerStateChange, TaskStateChange};

/// 线上原始容器描述，字段均可缺失，由 `Task::from_acs` 校验
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcsContainer {
    pub name: Option<String>,
    pub image: Option<String>,
    pub essential: Option<bool>,
    pub cpu: Option<u32>,
    pub memory: Option<u32>,
}

/// 线上原始任务描述
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcsTask {
    pub arn: Option<String>,
    pub family: Option<String>,
    pub version: Option<String>,
    pub desired_status: Option<String>,
    #[serde(default)]
    pub containers: Vec<AcsContainer>,
}

impl AcsTask {
    /// 解码单个任务元素
    pub fn from_value(raw: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(raw)
    }

    /// 不经完整解码直接取 arn；任务解码失败时仍可据此上报
    pub fn arn_of(raw: &Value) -> Option<&str> {
        raw.get("arn")
            .and_then(Value::as_str)
            .filter(|arn| !arn.is_empty())
    }
}

/// 任务定义载荷
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadMessage {
    /// 为空的载荷只记日志，不处理也不确认
    #[serde(default)]
    pub message_id: String,
    pub seq_num: Option<i64>,
    /// 每个任务单独解码：类型错误只影响该任务；`null` 元素处理时按失败任务计
    #[serde(default)]
    pub tasks: Vec<Value>,
    pub cluster_arn: Option<String>,
    pub container_instance_arn: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatMessage {
    #[serde(default)]
    pub healthy: bool,
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseMessage {
    pub message: Option<String>,
}

/// 服务端异常类消息的公共形态
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub message: Option<String>,
}

/// 解码后的入站消息
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Payload(PayloadMessage),
    Heartbeat(HeartbeatMessage),
    Close(CloseMessage),
    ServerException(ErrorMessage),
    BadRequest(ErrorMessage),
    InvalidCluster(ErrorMessage),
}

/// 载荷确认
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckRequest {
    pub cluster: String,
    pub container_instance: String,
    pub message_id: String,
}

/// 出站消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum OutboundMessage {
    AckRequest(AckRequest),
    TaskStateChange(TaskStateChange),
    ContainerStateChange(ContainerStateChange),
}
