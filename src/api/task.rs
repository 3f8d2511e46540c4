//! 任务与容器描述
//!
//! `Task::from_acs` 负责把线上原始描述校验并转换为 Task；校验按任务独立进行，
//! 单个任务失败不影响同一载荷里的其它任务。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::Status;
use crate::core::TaskValidationError;
use crate::protocol::{AcsTask, PayloadMessage};

/// 任务中的容器描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// 任务内唯一的容器名
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub essential: bool,
    #[serde(default)]
    pub cpu: u32,
    #[serde(default)]
    pub memory: u32,
    #[serde(default)]
    pub desired_status: Status,
    #[serde(default)]
    pub known_status: Status,
}

/// 期望状态已校验的任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub arn: String,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub version: String,
    pub desired_status: Status,
    #[serde(default)]
    pub known_status: Status,
    #[serde(default)]
    pub containers: Vec<Container>,
    /// 期望状态为 Stopped 时记录所在载荷的序列号，引擎据此让同序号的 start 排在 stop 之后
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequence_number: Option<i64>,
}

impl Task {
    /// 从载荷中的单个任务元素解码并校验
    pub fn from_value(raw: &Value, payload: &PayloadMessage) -> Result<Self, TaskValidationError> {
        let acs = AcsTask::from_value(raw).map_err(|e| TaskValidationError::Malformed {
            arn: AcsTask::arn_of(raw).map(str::to_string),
            reason: e.to_string(),
        })?;
        Self::from_acs(&acs, payload)
    }

    /// 校验线上任务描述并转换；载荷序列号用于填充 stop_sequence_number
    pub fn from_acs(raw: &AcsTask, payload: &PayloadMessage) -> Result<Self, TaskValidationError> {
        let arn = match raw.arn.as_deref() {
            Some(arn) if !arn.is_empty() => arn.to_string(),
            _ => return Err(TaskValidationError::MissingArn),
        };

        let raw_status = raw
            .desired_status
            .as_deref()
            .ok_or_else(|| TaskValidationError::MissingField {
                arn: arn.clone(),
                field: "desiredStatus",
            })?;
        let desired_status =
            Status::from_wire(raw_status).ok_or_else(|| TaskValidationError::UnknownStatus {
                arn: arn.clone(),
                status: raw_status.to_string(),
            })?;

        let mut seen = HashSet::new();
        let mut containers = Vec::with_capacity(raw.containers.len());
        for c in &raw.containers {
            let name = match c.name.as_deref() {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => return Err(TaskValidationError::UnnamedContainer { arn }),
            };
            if !seen.insert(name.clone()) {
                return Err(TaskValidationError::DuplicateContainer { arn, name });
            }
            containers.push(Container {
                name,
                image: c.image.clone().unwrap_or_default(),
                essential: c.essential.unwrap_or(true),
                cpu: c.cpu.unwrap_or(0),
                memory: c.memory.unwrap_or(0),
                desired_status,
                known_status: Status::None,
            });
        }

        let stop_sequence_number = if desired_status.is_stopped() {
            payload.seq_num
        } else {
            None
        };

        Ok(Self {
            arn,
            family: raw.family.clone().unwrap_or_default(),
            version: raw.version.clone().unwrap_or_default(),
            desired_status,
            known_status: Status::None,
            containers,
            stop_sequence_number,
        })
    }

    pub fn container_by_name(&self, name: &str) -> Option<&Container> {
        self.containers.iter().find(|c| c.name == name)
    }

    pub fn is_desired_stopped(&self) -> bool {
        self.desired_status.is_stopped()
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} {}, Status: ({}->{}) Containers: {}",
            self.family,
            self.version,
            self.arn,
            self.known_status,
            self.desired_status,
            self.containers.len()
        )
    }
}

/// 运行时容器记录：docker id 与任务内的容器描述
///
/// 这是快照里的形态；在 StateStore 内部容器描述只存一份，见 `state::store`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DockerContainer {
    pub docker_id: String,
    #[serde(default)]
    pub docker_name: String,
    pub container: Container,
}

impl std::fmt::Display for DockerContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}) -> {}", self.docker_name, self.docker_id, self.container.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AcsContainer;

    fn payload(seq_num: Option<i64>) -> PayloadMessage {
        PayloadMessage {
            message_id: "m1".to_string(),
            seq_num,
            tasks: vec![],
            ..Default::default()
        }
    }

    fn raw(arn: Option<&str>, status: Option<&str>) -> AcsTask {
        AcsTask {
            arn: arn.map(str::to_string),
            family: Some("web".to_string()),
            version: Some("3".to_string()),
            desired_status: status.map(str::to_string),
            containers: vec![AcsContainer {
                name: Some("nginx".to_string()),
                image: Some("nginx:latest".to_string()),
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_from_acs_running() {
        let task = Task::from_acs(&raw(Some("t1"), Some("RUNNING")), &payload(Some(7))).unwrap();
        assert_eq!(task.arn, "t1");
        assert_eq!(task.desired_status, Status::Running);
        assert_eq!(task.stop_sequence_number, None);
        assert_eq!(task.container_by_name("nginx").unwrap().image, "nginx:latest");
    }

    #[test]
    fn test_from_acs_stopped_records_seq_num() {
        let task = Task::from_acs(&raw(Some("t2"), Some("STOPPED")), &payload(Some(7))).unwrap();
        assert!(task.is_desired_stopped());
        assert_eq!(task.stop_sequence_number, Some(7));
    }

    #[test]
    fn test_from_acs_rejects_invalid() {
        assert_eq!(
            Task::from_acs(&raw(None, Some("RUNNING")), &payload(None)),
            Err(TaskValidationError::MissingArn)
        );
        assert!(matches!(
            Task::from_acs(&raw(Some("t3"), Some("EXPLODED")), &payload(None)),
            Err(TaskValidationError::UnknownStatus { .. })
        ));
        assert!(matches!(
            Task::from_acs(&raw(Some("t4"), None), &payload(None)),
            Err(TaskValidationError::MissingField { field: "desiredStatus", .. })
        ));

        let mut dup = raw(Some("t5"), Some("RUNNING"));
        dup.containers.push(dup.containers[0].clone());
        assert!(matches!(
            Task::from_acs(&dup, &payload(None)),
            Err(TaskValidationError::DuplicateContainer { .. })
        ));
    }

    #[test]
    fn test_from_value_reports_malformed_with_arn() {
        let good = serde_json::json!({
            "arn": "t6",
            "desiredStatus": "RUNNING",
            "containers": [{"name": "nginx", "memory": 128}]
        });
        let task = Task::from_value(&good, &payload(None)).unwrap();
        assert_eq!(task.container_by_name("nginx").unwrap().memory, 128);

        let bad = serde_json::json!({
            "arn": "t7",
            "desiredStatus": "RUNNING",
            "containers": [{"name": "nginx", "cpu": -5}]
        });
        match Task::from_value(&bad, &payload(None)) {
            Err(TaskValidationError::Malformed { arn, .. }) => assert_eq!(arn.as_deref(), Some("t7")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
